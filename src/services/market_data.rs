//! Price history and indicator lookups.
//!
//! Series come from the configured provider through a TTL cache. A provider
//! failure or a series too short for the long moving average falls back to the
//! synthetic walk, so lookups never fail for an unrecognized code.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::services::cache::TtlCache;
use crate::services::indicators::{self, SMA_LONG};
use crate::sources::{PriceSeriesProvider, SyntheticPriceProvider};
use crate::types::{ChartPeriod, IndicatorSet, PriceSeries};

const MAX_STOCK_CODE_LEN: usize = 12;

/// Trim and uppercase a stock code, rejecting anything that is not a plain ticker.
pub fn normalize_stock_code(code: &str) -> Option<String> {
    let code = code.trim();
    let valid = !code.is_empty()
        && code.len() <= MAX_STOCK_CODE_LEN
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    valid.then(|| code.to_ascii_uppercase())
}

pub struct MarketDataService {
    primary: Arc<dyn PriceSeriesProvider>,
    fallback: SyntheticPriceProvider,
    cache: TtlCache<(String, ChartPeriod), PriceSeries>,
}

impl MarketDataService {
    pub fn new(primary: Arc<dyn PriceSeriesProvider>, cache_ttl: Duration) -> Self {
        Self {
            primary,
            fallback: SyntheticPriceProvider::new(),
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Service backed only by the synthetic walk.
    pub fn synthetic(cache_ttl: Duration) -> Self {
        Self::new(Arc::new(SyntheticPriceProvider::new()), cache_ttl)
    }

    pub fn source_name(&self) -> &'static str {
        self.primary.name()
    }

    /// Daily history for `stock_code` over `period`; never empty.
    pub async fn series(&self, stock_code: &str, period: ChartPeriod) -> PriceSeries {
        let cache_key = (stock_code.to_string(), period);
        if let Some(series) = self.cache.get(&cache_key) {
            debug!("Price cache hit for {} {}", stock_code, period);
            return series;
        }

        let bars = match self.primary.fetch_series(stock_code, period).await {
            Ok(bars) if bars.len() >= SMA_LONG => bars,
            Ok(bars) => {
                warn!(
                    "{} returned {} bars for {} {}, using synthetic series",
                    self.primary.name(),
                    bars.len(),
                    stock_code,
                    period
                );
                self.fallback.generate(stock_code, period, Utc::now().date_naive())
            }
            Err(e) => {
                warn!(
                    "{} failed for {} {}: {}, using synthetic series",
                    self.primary.name(),
                    stock_code,
                    period,
                    e
                );
                self.fallback.generate(stock_code, period, Utc::now().date_naive())
            }
        };

        let series = PriceSeries {
            stock_code: stock_code.to_string(),
            period,
            data: bars,
            last_updated: Utc::now(),
        };
        self.cache.insert(cache_key, series.clone());
        series
    }

    pub async fn indicators(&self, stock_code: &str, period: ChartPeriod) -> IndicatorSet {
        let series = self.series(stock_code, period).await;
        indicators::compute(&series.data)
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ProviderError;
    use crate::types::PriceBar;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        bars: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSeriesProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_series(
            &self,
            _stock_code: &str,
            _period: ChartPeriod,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            Ok((0..self.bars)
                .map(|i| PriceBar {
                    time: start + chrono::Duration::days(i as i64),
                    open: 100.0,
                    high: 100.0,
                    low: 100.0,
                    close: 100.0,
                    volume: 10,
                })
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl PriceSeriesProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_series(
            &self,
            stock_code: &str,
            _period: ChartPeriod,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            Err(ProviderError::UnknownStock(stock_code.to_string()))
        }
    }

    #[test]
    fn test_normalize_stock_code() {
        assert_eq!(normalize_stock_code(" 7203 ").as_deref(), Some("7203"));
        assert_eq!(normalize_stock_code("aapl").as_deref(), Some("AAPL"));
        assert_eq!(normalize_stock_code("7203.T").as_deref(), Some("7203.T"));
        assert!(normalize_stock_code("").is_none());
        assert!(normalize_stock_code("72 03").is_none());
        assert!(normalize_stock_code("../etc").is_none());
        assert!(normalize_stock_code("1234567890123").is_none());
    }

    #[tokio::test]
    async fn test_series_is_cached() {
        let provider = Arc::new(FixedProvider {
            bars: 90,
            calls: AtomicUsize::new(0),
        });
        let service = MarketDataService::new(provider.clone(), Duration::from_secs(60));

        let first = service.series("7203", ChartPeriod::OneMonth).await;
        let second = service.series("7203", ChartPeriod::OneMonth).await;

        assert_eq!(first.data.len(), 90);
        assert_eq!(first.data, second.data);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        service.series("7203", ChartPeriod::OneYear).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_series_falls_back() {
        let provider = Arc::new(FixedProvider {
            bars: 10,
            calls: AtomicUsize::new(0),
        });
        let service = MarketDataService::new(provider, Duration::from_secs(60));

        let series = service.series("7203", ChartPeriod::OneMonth).await;
        assert_eq!(series.data.len(), ChartPeriod::OneMonth.lookback_bars());
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let service = MarketDataService::new(Arc::new(FailingProvider), Duration::from_secs(60));
        let series = service.series("9999", ChartPeriod::ThreeMonths).await;

        assert_eq!(series.stock_code, "9999");
        assert_eq!(series.data.len(), ChartPeriod::ThreeMonths.lookback_bars());
    }

    #[tokio::test]
    async fn test_indicators_for_unknown_code() {
        let service = MarketDataService::synthetic(Duration::from_secs(60));
        let indicators = service.indicators("9999", ChartPeriod::OneMonth).await;

        assert!(indicators.sma_25.is_some());
        assert!(indicators.sma_75.is_some());
        assert!(indicators.rsi_14.is_some());
        assert!(indicators.macd_histogram.is_some());
    }
}
