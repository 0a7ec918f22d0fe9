pub mod auth;
pub mod cache;
pub mod explainer;
pub mod explanation_cache;
pub mod generator;
pub mod indicators;
pub mod market_data;
pub mod usage_limiter;

pub use auth::{AuthError, TokenVerifier};
pub use cache::TtlCache;
pub use explainer::ExplanationService;
pub use explanation_cache::{CacheStats, Cached, ExplanationCache};
pub use generator::{ExplanationGenerator, GenerationError, TemplateGenerator, DISCLAIMER};
pub use market_data::MarketDataService;
pub use usage_limiter::{UsageLimiter, UsagePolicy};
