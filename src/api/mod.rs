pub mod ai;
pub mod auth;
pub mod health;
pub mod stocks;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/ai", ai::router())
        .nest("/stocks", stocks::router())
}
