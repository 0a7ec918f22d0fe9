//! Explanation orchestration.
//!
//! A request for an explanation either hits the cache, or (on a miss) is
//! admitted by the usage limiter, computes indicators from fresh history and
//! asks the generator for text. Only the first caller for a key generates;
//! concurrent callers receive its record.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::AppError;
use crate::services::explanation_cache::ExplanationCache;
use crate::services::generator::{
    ensure_contract, ExplanationContext, ExplanationGenerator, GenerationError,
};
use crate::services::indicators;
use crate::services::market_data::{normalize_stock_code, MarketDataService};
use crate::services::usage_limiter::UsageLimiter;
use crate::types::{AuthenticatedUser, ChartPeriod, ExplanationKey, ExplanationRecord, UsageStatus};

const GENERATION_FAILED: &str = "Explanation generation is temporarily unavailable";

/// Validate a raw (code, period) pair into a cache key.
pub fn parse_key(stock_code: &str, chart_period: &str) -> Result<ExplanationKey, AppError> {
    let code = normalize_stock_code(stock_code)
        .ok_or_else(|| AppError::BadRequest(format!("invalid stock code: {:?}", stock_code)))?;
    let period = ChartPeriod::from_str(chart_period.trim())
        .ok_or_else(|| AppError::BadRequest(format!("invalid chart period: {:?}", chart_period)))?;
    Ok(ExplanationKey::new(code, period))
}

pub struct ExplanationService {
    market: Arc<MarketDataService>,
    cache: Arc<ExplanationCache>,
    limiter: Arc<UsageLimiter>,
    generator: Arc<dyn ExplanationGenerator>,
    timeout: Duration,
}

impl ExplanationService {
    pub fn new(
        market: Arc<MarketDataService>,
        cache: Arc<ExplanationCache>,
        limiter: Arc<UsageLimiter>,
        generator: Arc<dyn ExplanationGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            market,
            cache,
            limiter,
            generator,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<ExplanationCache> {
        &self.cache
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Cached explanation for the key, generating one on a miss.
    ///
    /// Quota is charged when a miss is admitted and is not refunded if the
    /// generation then fails.
    pub async fn explain(
        &self,
        user: &AuthenticatedUser,
        stock_code: &str,
        chart_period: &str,
    ) -> Result<ExplanationRecord, AppError> {
        let key = parse_key(stock_code, chart_period)?;
        let key_ref = &key;

        let cached = self
            .cache
            .get_or_try_insert_with(&key, move || self.generate(user, key_ref))
            .await?;

        if cached.is_hit() {
            info!("Explanation cache hit for {} (user {})", key, user.user_id);
        }
        Ok(cached.into_record())
    }

    async fn generate(
        &self,
        user: &AuthenticatedUser,
        key: &ExplanationKey,
    ) -> Result<ExplanationRecord, AppError> {
        let admitted_at = Utc::now();
        let status = self.limiter.check_and_increment_at(&user.user_id, admitted_at);
        if !status.allowed {
            let reason = status.reason.unwrap_or_default();
            info!("Denied generation of {} for user {}: {}", key, user.user_id, reason);
            return Err(AppError::QuotaExceeded(reason));
        }

        let series = self.market.series(&key.stock_code, key.chart_period).await;
        let ctx = ExplanationContext {
            stock_code: key.stock_code.clone(),
            period: key.chart_period,
            indicators: indicators::compute(&series.data),
            bars: series.data,
        };

        let outcome = tokio::time::timeout(self.timeout, self.generator.generate(&ctx))
            .await
            .unwrap_or(Err(GenerationError::Timeout(self.timeout)));
        let generated = match outcome {
            Ok(generated) => generated,
            Err(e) => {
                warn!("{} failed to explain {}: {}", self.generator.name(), key, e);
                return Err(AppError::GenerationFailed(GENERATION_FAILED.to_string()));
            }
        };

        if let Some(tokens) = generated.tokens_used {
            self.limiter.record_tokens(admitted_at, tokens);
        }

        info!(
            "Generated explanation for {} with {} (tokens: {:?}, remaining quota for {}: {})",
            key,
            self.generator.name(),
            generated.tokens_used,
            user.user_id,
            status.remaining_requests
        );

        let text = ensure_contract(&generated.text, &key.stock_code);
        Ok(ExplanationRecord::new(
            key,
            text,
            ctx.indicators,
            Utc::now(),
            self.cache.ttl(),
        ))
    }

    /// Read-only lookup; never generates or charges quota.
    pub fn cached(&self, stock_code: &str, chart_period: &str) -> Result<ExplanationRecord, AppError> {
        let key = parse_key(stock_code, chart_period)?;
        self.cache
            .get(&key)
            .ok_or_else(|| AppError::NotFound(format!("no cached explanation for {}", key)))
    }

    pub fn usage(&self, user: &AuthenticatedUser) -> UsageStatus {
        self.limiter.status(&user.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::generator::{GeneratedText, TemplateGenerator, DISCLAIMER};
    use crate::services::usage_limiter::UsagePolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
        text: &'static str,
        tokens: u32,
    }

    #[async_trait]
    impl ExplanationGenerator for CountingGenerator {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn generate(&self, _ctx: &ExplanationContext) -> Result<GeneratedText, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(GeneratedText {
                text: self.text.to_string(),
                tokens_used: Some(self.tokens),
            })
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ExplanationGenerator for FailingGenerator {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn generate(&self, _ctx: &ExplanationContext) -> Result<GeneratedText, GenerationError> {
            Err(GenerationError::Backend("boom".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl ExplanationGenerator for SlowGenerator {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn generate(&self, _ctx: &ExplanationContext) -> Result<GeneratedText, GenerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(GeneratedText {
                text: "late".to_string(),
                tokens_used: None,
            })
        }
    }

    fn service(generator: Arc<dyn ExplanationGenerator>) -> ExplanationService {
        service_with_policy(generator, UsagePolicy::default())
    }

    fn service_with_policy(
        generator: Arc<dyn ExplanationGenerator>,
        policy: UsagePolicy,
    ) -> ExplanationService {
        ExplanationService::new(
            Arc::new(MarketDataService::synthetic(Duration::from_secs(60))),
            ExplanationCache::new(chrono::Duration::hours(1)),
            Arc::new(UsageLimiter::new(policy)),
            generator,
            Duration::from_millis(200),
        )
    }

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            expires_at: i64::MAX,
        }
    }

    #[test]
    fn test_parse_key() {
        let key = parse_key("7203", "1M").unwrap();
        assert_eq!(key.stock_code, "7203");
        assert_eq!(key.chart_period, ChartPeriod::OneMonth);

        assert!(matches!(parse_key("7203", "2W"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_key("", "1M"), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_explain_generates_then_hits() {
        let service = service(Arc::new(TemplateGenerator::new()));
        let alice = user("alice");

        let first = service.explain(&alice, "7203", "1M").await.unwrap();
        assert!(first.explanation_text.contains("7203"));
        assert!(first.explanation_text.contains(DISCLAIMER));
        assert!(first.technical_data.sma_25.is_some());
        assert_eq!(service.usage(&alice).remaining_requests, 9);

        let second = service.explain(&alice, "7203", "1M").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.explanation_text, second.explanation_text);
        assert_eq!(service.usage(&alice).remaining_requests, 9);
    }

    #[tokio::test]
    async fn test_record_indicators_match_series() {
        let service = service(Arc::new(TemplateGenerator::new()));
        let record = service.explain(&user("bob"), "6758", "3M").await.unwrap();
        let expected = service.market.indicators("6758", ChartPeriod::ThreeMonths).await;
        assert_eq!(record.technical_data, expected);
    }

    #[tokio::test]
    async fn test_contract_enforced_on_backend_output() {
        let service = service(Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
            tokens: 600,
            text: "上昇傾向が続いています。",
        }));
        let record = service.explain(&user("carol"), "9984", "1W").await.unwrap();

        assert!(record.explanation_text.starts_with("【9984】"));
        assert!(record.explanation_text.contains(DISCLAIMER));
    }

    #[tokio::test]
    async fn test_failure_stores_nothing_and_keeps_charge() {
        let service = service(Arc::new(FailingGenerator));
        let dave = user("dave");

        let err = service.explain(&dave, "7203", "1M").await.unwrap_err();
        assert!(matches!(err, AppError::GenerationFailed(_)));
        assert!(matches!(service.cached("7203", "1M"), Err(AppError::NotFound(_))));
        assert_eq!(service.usage(&dave).remaining_requests, 9);
    }

    #[tokio::test]
    async fn test_timeout_is_generation_failure() {
        let service = service(Arc::new(SlowGenerator));
        let err = service.explain(&user("erin"), "7203", "1M").await.unwrap_err();

        assert!(matches!(err, AppError::GenerationFailed(_)));
        assert!(service.cache().get(&parse_key("7203", "1M").unwrap()).is_none());
    }

    #[test]
    fn test_timeout_error_names_limit() {
        let err = GenerationError::Timeout(Duration::from_millis(200));
        assert_eq!(err.to_string(), "Generation timed out after 200ms");
    }

    #[tokio::test]
    async fn test_reported_tokens_settle_reservation() {
        // Two estimates (1300) would not fit; estimate plus a 600 report does
        let service = service_with_policy(
            Arc::new(CountingGenerator {
                calls: AtomicUsize::new(0),
                tokens: 600,
                text: "トヨタは上昇傾向です。",
            }),
            UsagePolicy {
                app_minute_tokens: 1_250,
                ..UsagePolicy::default()
            },
        );

        service.explain(&user("gail"), "7203", "1M").await.unwrap();
        let second = service.explain(&user("gail"), "6758", "1M").await;
        assert!(second.is_ok(), "{:?}", second.err());
    }

    #[tokio::test]
    async fn test_quota_exceeded_after_ten_misses() {
        let service = service(Arc::new(TemplateGenerator::new()));
        let frank = user("frank");
        let codes = ["1001", "1002", "1003", "1004", "1005", "1006", "1007", "1008", "1009", "1010"];

        for code in codes {
            service.explain(&frank, code, "1M").await.unwrap();
        }

        let err = service.explain(&frank, "1011", "1M").await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ref r) if r == "Daily user limit exceeded"));
        assert!(matches!(service.cached("1011", "1M"), Err(AppError::NotFound(_))));

        // Hits are still served once the quota is spent
        assert!(service.explain(&frank, "1001", "1M").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_misses_generate_once() {
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
            tokens: 600,
            text: "6861は横ばいです。",
        });
        let service = Arc::new(service(generator.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .explain(&user(&format!("user-{}", i)), "6861", "6M")
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
