//! Relative Strength Index (RSI) indicator.

/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// Measures momentum by comparing the magnitude of recent gains to recent losses.
/// Values range from 0-100:
/// - Below 30: Oversold
/// - Above 70: Overbought
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Minimum number of closes needed (one more than the period, for the deltas).
    pub fn min_periods(&self) -> usize {
        self.period + 1
    }

    /// Calculate RSI from closing prices.
    pub fn calculate(&self, closes: &[f64]) -> Option<f64> {
        let period = self.period;
        if period == 0 || closes.len() < self.min_periods() {
            return None;
        }

        let mut gains = Vec::with_capacity(closes.len() - 1);
        let mut losses = Vec::with_capacity(closes.len() - 1);

        for pair in closes.windows(2) {
            let change = pair[1] - pair[0];
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(-change);
            }
        }

        // Initial averages are simple means
        let mut avg_gain: f64 = gains.iter().take(period).sum::<f64>() / period as f64;
        let mut avg_loss: f64 = losses.iter().take(period).sum::<f64>() / period as f64;

        for i in period..gains.len() {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        }

        if !avg_gain.is_finite() || !avg_loss.is_finite() {
            return None;
        }

        // Flat series: no gains and no losses
        if avg_gain == 0.0 && avg_loss == 0.0 {
            return Some(50.0);
        }
        if avg_loss == 0.0 {
            return Some(100.0);
        }

        let rs = avg_gain / avg_loss;
        Some((100.0 - (100.0 / (1.0 + rs))).clamp(0.0, 100.0))
    }
}
