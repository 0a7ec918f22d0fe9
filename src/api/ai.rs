use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};

use super::auth::Authenticated;
use crate::error::{AppError, Result};
use crate::types::{ExplainRequest, ExplanationRecord, UsageStatus};
use crate::AppState;

/// POST /ai/explain
///
/// Explanation for a stock and chart period, generated on a cache miss.
async fn explain(
    auth: Authenticated,
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplanationRecord>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let record = state
        .explainer
        .explain(&auth.user, &request.stock_code, &request.chart_period)
        .await?;
    Ok(Json(record))
}

/// GET /ai/explain/:stock_code/:chart_period
///
/// Cached explanation only; no authentication or quota involved.
async fn get_cached(
    State(state): State<AppState>,
    Path((stock_code, chart_period)): Path<(String, String)>,
) -> Result<Json<ExplanationRecord>> {
    let record = state.explainer.cached(&stock_code, &chart_period)?;
    Ok(Json(record))
}

/// GET /ai/usage
async fn get_usage(auth: Authenticated, State(state): State<AppState>) -> Json<UsageStatus> {
    Json(state.explainer.usage(&auth.user))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/explain", post(explain))
        .route("/explain/:stock_code/:chart_period", get(get_cached))
        .route("/usage", get(get_usage))
}
