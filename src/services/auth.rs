/**
 * Bearer Token Verification
 *
 * Tokens are minted by the account service and carry their own expiry:
 *
 *   {user_id}.{expires_unix}.{hex(HMAC-SHA256(secret, "{user_id}.{expires_unix}"))}
 *
 * Verification is stateless, so no session store is needed here.
 */

use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::types::AuthenticatedUser;

type HmacSha256 = Hmac<Sha256>;

/// Verifies (and, for tooling, issues) signed bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Verifier with a random secret; tokens from other processes won't verify.
    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(secret)
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidSecret)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Sign a token for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: &str, ttl: chrono::Duration) -> Result<String, AuthError> {
        if user_id.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let expires = (Utc::now() + ttl).timestamp();
        let payload = format!("{}.{}", user_id, expires);
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Check signature and expiry, returning the caller identity.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        // user ids may contain dots, so split from the right
        let mut parts = token.trim().rsplitn(3, '.');
        let (Some(signature), Some(expires), Some(user_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };
        if user_id.is_empty() {
            return Err(AuthError::MalformedToken);
        }

        let expires_at: i64 = expires.parse().map_err(|_| AuthError::MalformedToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        self.mac(&format!("{}.{}", user_id, expires))?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        if expires_at <= Utc::now().timestamp() {
            debug!("Expired token for user {}", user_id);
            return Err(AuthError::Expired);
        }

        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
            expires_at,
        })
    }
}

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid signing secret")]
    InvalidSecret,
}

impl From<AuthError> for AppError {
    fn from(_: AuthError) -> Self {
        AppError::Unauthorized
    }
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        debug!("Rejected request: {}", self);
        AppError::from(self).into_response()
    }
}
