//! MACD (Moving Average Convergence Divergence) indicator.

use super::ema::ema_series;
use super::finite;

/// MACD indicator.
///
/// Shows the relationship between two EMAs:
/// - MACD Line = EMA(12) - EMA(26)
/// - Signal Line = EMA(9) of MACD Line
/// - Histogram = MACD Line - Signal Line
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

/// Latest MACD values. The signal line needs `signal_period - 1` more bars
/// than the MACD line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValues {
    pub line: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

impl Macd {
    /// Bars needed before the MACD line exists (slow EMA seeded).
    pub fn min_periods(&self) -> usize {
        self.slow_period
    }

    /// Bars needed before the signal line exists.
    pub fn signal_min_periods(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    pub fn calculate(&self, closes: &[f64]) -> Option<MacdValues> {
        if closes.len() < self.min_periods() || self.fast_period > self.slow_period {
            return None;
        }

        let fast_ema = ema_series(closes, self.fast_period);
        let slow_ema = ema_series(closes, self.slow_period);

        // Align the EMAs (fast starts earlier)
        let offset = self.slow_period - self.fast_period;
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .skip(offset)
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let line = finite(*macd_line.last()?)?;

        let signal = ema_series(&macd_line, self.signal_period)
            .last()
            .copied()
            .and_then(finite);

        Some(MacdValues {
            line,
            signal,
            histogram: signal.and_then(|s| finite(line - s)),
        })
    }
}
