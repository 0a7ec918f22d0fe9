//! Simple Moving Average (SMA).

use super::finite;

/// Arithmetic mean of the last `period` values.
///
/// Returns `None` when fewer than `period` values exist.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    finite(sum / period as f64)
}
