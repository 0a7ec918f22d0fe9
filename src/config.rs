use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::usage_limiter::UsagePolicy;

/// Where daily price history comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Deterministic random walk, no network access.
    Synthetic,
    /// Yahoo Finance chart API, falling back to the walk on failure.
    Yahoo,
}

impl PriceSource {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" => Some(PriceSource::Synthetic),
            "yahoo" => Some(PriceSource::Yahoo),
            _ => None,
        }
    }
}

/// Generation quotas.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Explanations a user may generate per UTC day (default: 10).
    pub user_daily_limit: u32,
    /// App-wide generations per day (default: 170).
    pub app_daily_requests: u32,
    /// App-wide generations per minute (default: 25).
    pub app_minute_requests: u32,
    /// App-wide estimated tokens per minute (default: 850,000).
    pub app_minute_tokens: u32,
    /// Token estimate per generation (default: 650).
    pub tokens_per_request: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let policy = UsagePolicy::default();
        Self {
            user_daily_limit: policy.user_daily_limit,
            app_daily_requests: policy.app_daily_requests,
            app_minute_requests: policy.app_minute_requests,
            app_minute_tokens: policy.app_minute_tokens,
            tokens_per_request: policy.tokens_per_request,
        }
    }
}

impl LimitsConfig {
    pub fn policy(&self) -> UsagePolicy {
        UsagePolicy {
            user_daily_limit: self.user_daily_limit,
            app_daily_requests: self.app_daily_requests,
            app_minute_requests: self.app_minute_requests,
            app_minute_tokens: self.app_minute_tokens,
            tokens_per_request: self.tokens_per_request,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Redis URL for explanation persistence (in-memory only when unset).
    pub redis_url: Option<String>,
    /// Allowed CORS origin (any origin when unset).
    pub cors_origin: Option<String>,
    /// Shared secret for bearer token signatures.
    pub auth_secret: Option<String>,
    pub price_source: PriceSource,
    /// Gemini API key; the template generator is used when unset.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Explanation lifetime in seconds.
    pub explanation_ttl_secs: u64,
    /// Price series cache lifetime in seconds.
    pub price_cache_ttl_secs: u64,
    /// Upper bound on one generator call in milliseconds.
    pub generation_timeout_ms: u64,
    pub limits: LimitsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            redis_url: None,
            cors_origin: None,
            auth_secret: None,
            price_source: PriceSource::Synthetic,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash-exp".to_string(),
            explanation_ttl_secs: 3600,
            price_cache_ttl_secs: 1800,
            generation_timeout_ms: 30_000,
            limits: LimitsConfig::default(),
        }
    }
}

/// Parse `key`, keeping `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Non-empty value of `key`.
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limits = defaults.limits.clone();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            redis_url: env_opt("REDIS_URL"),
            cors_origin: env_opt("CORS_ORIGIN"),
            auth_secret: env_opt("AUTH_SECRET"),
            price_source: env::var("PRICE_SOURCE")
                .ok()
                .and_then(|v| PriceSource::from_str(&v))
                .unwrap_or(defaults.price_source),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_opt("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            explanation_ttl_secs: env_or("EXPLANATION_TTL_SECS", defaults.explanation_ttl_secs),
            price_cache_ttl_secs: env_or("PRICE_CACHE_TTL_SECS", defaults.price_cache_ttl_secs),
            generation_timeout_ms: env_or("GENERATION_TIMEOUT_MS", defaults.generation_timeout_ms),
            limits: LimitsConfig {
                user_daily_limit: env_or("USER_DAILY_LIMIT", limits.user_daily_limit),
                app_daily_requests: env_or("APP_DAILY_REQUESTS", limits.app_daily_requests),
                app_minute_requests: env_or("APP_MINUTE_REQUESTS", limits.app_minute_requests),
                app_minute_tokens: env_or("APP_MINUTE_TOKENS", limits.app_minute_tokens),
                tokens_per_request: env_or("TOKENS_PER_REQUEST", limits.tokens_per_request),
            },
        }
    }

    pub fn explanation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.explanation_ttl_secs as i64)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}
