//! Authentication Types
//!
//! Identity carried by a verified bearer token. Tokens are minted by the
//! account service; this server only verifies them.

use serde::{Deserialize, Serialize};

/// Caller identity resolved from the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Opaque user identifier (the account service's user UUID)
    pub user_id: String,
    /// Token expiration (unix seconds)
    pub expires_at: i64,
}
