//! Exponential Moving Average (EMA).

/// EMA over `values`, seeded with the SMA of the first `period` values and
/// then smoothed with factor `2 / (period + 1)`.
///
/// Element `i` of the result lines up with `values[period - 1 + i]`; the
/// result is empty when fewer than `period` values exist.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut series = Vec::with_capacity(values.len() - period + 1);

    // First EMA is SMA
    let seed: f64 = values.iter().take(period).sum::<f64>() / period as f64;
    series.push(seed);

    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
        series.push(ema);
    }

    series
}
