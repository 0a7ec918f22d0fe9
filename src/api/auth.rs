/**
 * Authentication extractor
 *
 * Routes that need a caller identity take `Authenticated` as their first
 * argument; it reads `Authorization: Bearer <token>` and verifies it before
 * any other work happens.
 */

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use crate::services::auth::{AuthError, TokenVerifier};
use crate::types::AuthenticatedUser;
use crate::AppState;

/// Authenticated user extractor.
///
/// ```ignore
/// async fn my_handler(auth: Authenticated) -> impl IntoResponse {
///     let user_id = auth.user.user_id;
///     // ...
/// }
/// ```
pub struct Authenticated {
    pub user: AuthenticatedUser,
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    Arc<TokenVerifier>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);
        let token = bearer_token(parts)?;
        let user = verifier.verify(token)?;

        Ok(Authenticated { user })
    }
}
