use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::services::market_data::normalize_stock_code;
use crate::types::{ChartPeriod, IndicatorSet, PriceSeries};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

impl PeriodQuery {
    /// Requested period; `1M` when omitted or unrecognized.
    fn parse(&self) -> ChartPeriod {
        let Some(p) = self.period.as_deref() else {
            return ChartPeriod::OneMonth;
        };
        ChartPeriod::from_str(p.trim()).unwrap_or_else(|| {
            debug!("Unknown period {:?}, using 1M", p);
            ChartPeriod::OneMonth
        })
    }
}

fn stock_code(raw: &str) -> Result<String> {
    normalize_stock_code(raw)
        .ok_or_else(|| AppError::BadRequest(format!("invalid stock code: {:?}", raw)))
}

/// GET /stocks/:code/indicators?period=1M
async fn get_indicators(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<IndicatorSet>> {
    let period = query.parse();
    let code = stock_code(&code)?;
    Ok(Json(state.market.indicators(&code, period).await))
}

/// GET /stocks/:code/price?period=1M
async fn get_price(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<PriceSeries>> {
    let period = query.parse();
    let code = stock_code(&code)?;
    Ok(Json(state.market.series(&code, period).await))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:code/indicators", get(get_indicators))
        .route("/:code/price", get(get_price))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_query_defaults_to_one_month() {
        let query = PeriodQuery { period: None };
        assert_eq!(query.parse(), ChartPeriod::OneMonth);
    }

    #[test]
    fn test_period_query_unknown_falls_back_to_one_month() {
        for raw in ["5Y", "INVALID", ""] {
            let query = PeriodQuery {
                period: Some(raw.to_string()),
            };
            assert_eq!(query.parse(), ChartPeriod::OneMonth, "{:?}", raw);
        }

        let query = PeriodQuery {
            period: Some(" 6M ".to_string()),
        };
        assert_eq!(query.parse(), ChartPeriod::SixMonths);
    }

    #[test]
    fn test_stock_code_validation() {
        assert_eq!(stock_code("7203").unwrap(), "7203");
        assert!(stock_code("72 03").is_err());
    }
}
