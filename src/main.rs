use axum::http::HeaderValue;
use kotori::config::{Config, PriceSource};
use kotori::services::{ExplanationGenerator, MarketDataService, TemplateGenerator, TokenVerifier};
use kotori::sources::{GeminiGenerator, PriceSeriesProvider, SyntheticPriceProvider, YahooPriceProvider};
use kotori::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired explanations and price series are dropped.
const PURGE_INTERVAL_SECS: u64 = 300;

fn price_provider(config: &Config) -> Arc<dyn PriceSeriesProvider> {
    match config.price_source {
        PriceSource::Yahoo => match YahooPriceProvider::new() {
            Ok(provider) => {
                info!("Using Yahoo Finance price history");
                Arc::new(provider)
            }
            Err(e) => {
                warn!("Failed to build Yahoo client: {}. Using synthetic prices.", e);
                Arc::new(SyntheticPriceProvider::new())
            }
        },
        PriceSource::Synthetic => {
            info!("Using synthetic price history");
            Arc::new(SyntheticPriceProvider::new())
        }
    }
}

fn explanation_generator(config: &Config) -> Arc<dyn ExplanationGenerator> {
    let Some(ref api_key) = config.gemini_api_key else {
        info!("No Gemini API key, using template explanations");
        return Arc::new(TemplateGenerator::new());
    };

    match GeminiGenerator::new(api_key.clone(), config.gemini_model.clone()) {
        Ok(generator) => {
            info!("Gemini API key found, using model {}", config.gemini_model);
            Arc::new(generator)
        }
        Err(e) => {
            warn!("Failed to build Gemini client: {}. Using template explanations.", e);
            Arc::new(TemplateGenerator::new())
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            warn!("Invalid CORS_ORIGIN: {}. Allowing any origin.", e);
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kotori=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!("Starting Kotori server on {}:{}", config.host, config.port);

    let verifier = match config.auth_secret {
        Some(ref secret) => TokenVerifier::new(secret),
        None => {
            warn!("AUTH_SECRET not set, generated a random secret; no issued token will verify");
            TokenVerifier::random()
        }
    };

    let market = Arc::new(MarketDataService::new(
        price_provider(&config),
        config.price_cache_ttl(),
    ));
    let generator = explanation_generator(&config);

    let state = AppState::new(config.clone(), market.clone(), generator, verifier);

    // Restore unexpired explanations from Redis
    if let Some(ref redis_url) = config.redis_url {
        let cache = state.explainer.cache();
        cache.connect_redis(redis_url).await;
        cache.load_from_redis().await;
    }

    // Periodic cleanup of expired entries
    {
        let cache = state.explainer.cache().clone();
        let market = market.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(PURGE_INTERVAL_SECS)).await;
                let explanations = cache.purge_expired();
                let series = market.purge_expired();
                if explanations > 0 || series > 0 {
                    debug!(
                        "Purged {} expired explanations and {} price series",
                        explanations, series
                    );
                }
            }
        });
    }

    let app = kotori::app(state)
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Kotori server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
