use serde::{Deserialize, Serialize};

/// Technical indicators derived from a price series.
///
/// Each value is `None` when the series is too short for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_25: Option<f64>,
    pub sma_75: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub volume_sma_25: Option<f64>,
}
