//! Kotori - technical indicators and plain-language chart explanations for
//! Tokyo Stock Exchange listings

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use axum::Router;
use std::sync::Arc;

use config::Config;
use services::{
    ExplanationCache, ExplanationGenerator, ExplanationService, MarketDataService, TokenVerifier,
    UsageLimiter,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub explainer: Arc<ExplanationService>,
    pub market: Arc<MarketDataService>,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Wire the shared services from configuration and the chosen backends.
    pub fn new(
        config: Config,
        market: Arc<MarketDataService>,
        generator: Arc<dyn ExplanationGenerator>,
        verifier: TokenVerifier,
    ) -> Self {
        let cache = ExplanationCache::new(config.explanation_ttl());
        let limiter = Arc::new(UsageLimiter::new(config.limits.policy()));
        let explainer = Arc::new(ExplanationService::new(
            market.clone(),
            cache,
            limiter,
            generator,
            config.generation_timeout(),
        ));

        Self {
            config: Arc::new(config),
            explainer,
            market,
            verifier: Arc::new(verifier),
        }
    }
}

/// Router with all API routes bound to `state`; middleware is added by the binary.
pub fn app(state: AppState) -> Router {
    api::router().with_state(state)
}

// Re-export commonly used types
pub use types::*;
