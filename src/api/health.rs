use crate::services::explanation_cache::CacheStats;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    price_source: &'static str,
    generator: &'static str,
    explanations: CacheStats,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        price_source: state.market.source_name(),
        generator: state.explainer.generator_name(),
        explanations: state.explainer.cache().stats(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
