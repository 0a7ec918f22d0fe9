use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Chart period selectable on the stock detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartPeriod {
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl ChartPeriod {
    /// Get the period from its wire label.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1W" => Some(ChartPeriod::OneWeek),
            "1M" => Some(ChartPeriod::OneMonth),
            "3M" => Some(ChartPeriod::ThreeMonths),
            "6M" => Some(ChartPeriod::SixMonths),
            "1Y" => Some(ChartPeriod::OneYear),
            _ => None,
        }
    }

    /// Wire label, also used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartPeriod::OneWeek => "1W",
            ChartPeriod::OneMonth => "1M",
            ChartPeriod::ThreeMonths => "3M",
            ChartPeriod::SixMonths => "6M",
            ChartPeriod::OneYear => "1Y",
        }
    }

    /// Number of daily bars fetched for this period.
    ///
    /// Short periods still pull enough history for SMA75 to be computable.
    pub fn lookback_bars(&self) -> usize {
        match self {
            ChartPeriod::OneWeek => 80,
            ChartPeriod::OneMonth => 90,
            ChartPeriod::ThreeMonths => 120,
            ChartPeriod::SixMonths => 180,
            ChartPeriod::OneYear => 365,
        }
    }

    /// Yahoo Finance range wide enough to cover `lookback_bars` trading days.
    pub fn yahoo_range(&self) -> &'static str {
        match self {
            ChartPeriod::OneWeek | ChartPeriod::OneMonth => "6mo",
            ChartPeriod::ThreeMonths | ChartPeriod::SixMonths => "1y",
            ChartPeriod::OneYear => "2y",
        }
    }
}

impl std::fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Price history response for a stock and period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub stock_code: String,
    pub period: ChartPeriod,
    pub data: Vec<PriceBar>,
    pub last_updated: DateTime<Utc>,
}
