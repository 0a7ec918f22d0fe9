//! Deterministic synthetic price history.
//!
//! Used when no market data source is configured and as the fallback for
//! codes the real source does not know. The walk is seeded from the stock
//! code, period and end date, so a given day always sees the same series.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::{PriceSeriesProvider, ProviderError};
use crate::types::{ChartPeriod, PriceBar};

/// Reference prices for well-known TSE codes.
const BASE_PRICES: &[(&str, f64)] = &[
    ("7203", 3420.0),
    ("6758", 13850.0),
    ("9984", 7890.0),
    ("6861", 52300.0),
];

const DEFAULT_BASE_PRICE: f64 = 1000.0;

/// Maximum absolute daily move of the walk.
const MAX_DAILY_CHANGE: f64 = 0.03;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticPriceProvider;

impl SyntheticPriceProvider {
    pub fn new() -> Self {
        Self
    }

    /// Generate `period.lookback_bars()` weekday bars ending on or before `end`.
    pub fn generate(&self, stock_code: &str, period: ChartPeriod, end: NaiveDate) -> Vec<PriceBar> {
        let dates = trading_days_ending(end, period.lookback_bars());
        let mut rng = StdRng::seed_from_u64(seed_for(stock_code, period, end));
        let mut price = base_price(stock_code);

        dates
            .into_iter()
            .map(|time| {
                let change: f64 = rng.gen_range(-MAX_DAILY_CHANGE..MAX_DAILY_CHANGE);
                let open = price;
                let close = open * (1.0 + change);
                let high = open.max(close) * (1.0 + change.abs() * 0.5);
                let low = open.min(close) * (1.0 - change.abs() * 0.5);
                let volume = rng.gen_range(1_000_000..5_000_000u64);
                price = close;

                PriceBar {
                    time,
                    open: round2(open),
                    high: round2(high),
                    low: round2(low),
                    close: round2(close),
                    volume,
                }
            })
            .collect()
    }
}

#[async_trait]
impl PriceSeriesProvider for SyntheticPriceProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch_series(
        &self,
        stock_code: &str,
        period: ChartPeriod,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        Ok(self.generate(stock_code, period, Utc::now().date_naive()))
    }
}

fn base_price(stock_code: &str) -> f64 {
    BASE_PRICES
        .iter()
        .find(|(code, _)| *code == stock_code)
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_BASE_PRICE)
}

fn seed_for(stock_code: &str, period: ChartPeriod, end: NaiveDate) -> u64 {
    let digest = Sha256::digest(format!("{}|{}|{}", stock_code, period, end).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// The last `count` weekdays up to and including `end`, ascending.
fn trading_days_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = end;
    while days.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    days.reverse();
    days
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
