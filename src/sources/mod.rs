//! External data and text-generation backends.

pub mod gemini;
pub mod synthetic;
pub mod yahoo;

pub use gemini::GeminiGenerator;
pub use synthetic::SyntheticPriceProvider;
pub use yahoo::YahooPriceProvider;

use crate::types::{ChartPeriod, PriceBar};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from a price history backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Unknown stock code: {0}")]
    UnknownStock(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Source of daily OHLCV history.
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch bars for a stock, ascending by date, covering `period.lookback_bars()`.
    async fn fetch_series(
        &self,
        stock_code: &str,
        period: ChartPeriod,
    ) -> Result<Vec<PriceBar>, ProviderError>;
}
