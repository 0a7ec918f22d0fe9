use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChartPeriod, IndicatorSet};

/// Body of `POST /ai/explain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub stock_code: String,
    pub chart_period: String,
}

/// Cache slot identity: one explanation per stock and chart period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExplanationKey {
    pub stock_code: String,
    pub chart_period: ChartPeriod,
}

impl ExplanationKey {
    pub fn new(stock_code: impl Into<String>, chart_period: ChartPeriod) -> Self {
        Self {
            stock_code: stock_code.into(),
            chart_period,
        }
    }
}

impl std::fmt::Display for ExplanationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.stock_code, self.chart_period)
    }
}

/// A generated explanation, immutable until it expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRecord {
    pub id: Uuid,
    pub stock_code: String,
    pub chart_period: ChartPeriod,
    pub explanation_text: String,
    pub technical_data: IndicatorSet,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ExplanationRecord {
    /// Create a fresh record living for `ttl` from `created_at`.
    pub fn new(
        key: &ExplanationKey,
        explanation_text: String,
        technical_data: IndicatorSet,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stock_code: key.stock_code.clone(),
            chart_period: key.chart_period,
            explanation_text,
            technical_data,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn key(&self) -> ExplanationKey {
        ExplanationKey::new(self.stock_code.clone(), self.chart_period)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_expiry_boundary() {
        let key = ExplanationKey::new("7203", ChartPeriod::OneMonth);
        let created = Utc::now();
        let record = ExplanationRecord::new(
            &key,
            "text".to_string(),
            IndicatorSet::default(),
            created,
            chrono::Duration::seconds(60),
        );

        assert!(!record.is_expired_at(created));
        assert!(!record.is_expired_at(created + chrono::Duration::seconds(59)));
        assert!(record.is_expired_at(created + chrono::Duration::seconds(60)));
        assert_eq!(record.key(), key);
    }

    #[test]
    fn test_record_wire_shape() {
        let key = ExplanationKey::new("6758", ChartPeriod::ThreeMonths);
        let record = ExplanationRecord::new(
            &key,
            "text".to_string(),
            IndicatorSet::default(),
            Utc::now(),
            chrono::Duration::hours(1),
        );
        let json = serde_json::to_value(&record).unwrap();

        for field in [
            "id",
            "stock_code",
            "chart_period",
            "explanation_text",
            "technical_data",
            "created_at",
            "expires_at",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["chart_period"], "3M");
        assert_eq!(json["stock_code"], "6758");

        // Redis copies are read back from the same JSON
        let stored = serde_json::to_string(&record).unwrap();
        let restored: ExplanationRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, record);
        assert_eq!(restored.key(), key);
    }

    #[test]
    fn test_key_display() {
        let key = ExplanationKey::new("9984", ChartPeriod::OneYear);
        assert_eq!(key.to_string(), "9984:1Y");
    }
}
