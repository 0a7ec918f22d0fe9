//! Yahoo Finance chart API client for daily stock history.
//!
//! Tokyo Stock Exchange codes are numeric ("7203"); Yahoo lists them with a
//! ".T" suffix.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{PriceSeriesProvider, ProviderError};
use crate::types::{ChartPeriod, PriceBar};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart response.
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

/// Map a stock code to a Yahoo symbol.
fn yahoo_symbol(stock_code: &str) -> String {
    if !stock_code.is_empty() && stock_code.chars().all(|c| c.is_ascii_digit()) {
        format!("{}.T", stock_code)
    } else {
        stock_code.to_uppercase().replace('.', "-")
    }
}

/// Yahoo Finance price history provider.
pub struct YahooPriceProvider {
    client: Client,
    base_url: String,
}

impl YahooPriceProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PriceSeriesProvider for YahooPriceProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_series(
        &self,
        stock_code: &str,
        period: ChartPeriod,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d&includePrePost=false",
            self.base_url,
            yahoo_symbol(stock_code),
            period.yahoo_range()
        );

        debug!("Fetching Yahoo Finance data: {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownStock(stock_code.to_string()));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "API error: {}",
                response.status()
            )));
        }

        let data: YahooChartResponse = response.json().await?;
        parse_chart(data, stock_code, period.lookback_bars())
    }
}

/// Turn a chart response into at most `lookback` ascending bars.
fn parse_chart(
    data: YahooChartResponse,
    stock_code: &str,
    lookback: usize,
) -> Result<Vec<PriceBar>, ProviderError> {
    if let Some(error) = data.chart.error {
        return Err(ProviderError::Upstream(format!(
            "Yahoo API error: {} - {}",
            error.code, error.description
        )));
    }

    let result = data
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ProviderError::UnknownStock(stock_code.to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Upstream("No quote data in response".to_string()))?;

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        let close = closes.get(i).and_then(|v| *v).unwrap_or(0.0);

        // Skip halted days and partial rows
        if close <= 0.0 {
            continue;
        }
        let Some(time) = DateTime::from_timestamp(timestamp, 0).map(|t| t.date_naive()) else {
            continue;
        };

        bars.push(PriceBar {
            time,
            open: opens.get(i).and_then(|v| *v).unwrap_or(close),
            high: highs.get(i).and_then(|v| *v).unwrap_or(close),
            low: lows.get(i).and_then(|v| *v).unwrap_or(close),
            close,
            volume: volumes.get(i).and_then(|v| *v).unwrap_or(0),
        });
    }

    if bars.is_empty() {
        return Err(ProviderError::UnknownStock(stock_code.to_string()));
    }

    let skip = bars.len().saturating_sub(lookback);
    Ok(bars.split_off(skip))
}
