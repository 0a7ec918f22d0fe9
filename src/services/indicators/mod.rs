//! Technical indicator engine.
//!
//! Pure functions over a daily OHLCV series. Identical input always yields
//! identical output; nothing here touches shared state.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::ema_series;
pub use macd::{Macd, MacdValues};
pub use rsi::Rsi;
pub use sma::sma;

use crate::types::{IndicatorSet, PriceBar};

/// Short moving average window (bars).
pub const SMA_SHORT: usize = 25;
/// Long moving average window (bars).
pub const SMA_LONG: usize = 75;
/// RSI lookback (bars).
pub const RSI_PERIOD: usize = 14;
/// Volume moving average window (bars).
pub const VOLUME_SMA: usize = 25;

/// Compute the full indicator set for an ascending series of bars.
pub fn compute(bars: &[PriceBar]) -> IndicatorSet {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let macd = Macd::default().calculate(&closes);

    IndicatorSet {
        sma_25: sma(&closes, SMA_SHORT),
        sma_75: sma(&closes, SMA_LONG),
        rsi_14: Rsi::new(RSI_PERIOD).calculate(&closes),
        macd_line: macd.map(|m| m.line),
        macd_signal: macd.and_then(|m| m.signal),
        macd_histogram: macd.and_then(|m| m.histogram),
        volume_sma_25: sma(&volumes, VOLUME_SMA),
    }
}

/// Drop NaN and infinities so they serialize as `null`.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
