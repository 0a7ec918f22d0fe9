use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Explanation generations made by one user on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub requests_made: u32,
    pub daily_limit: u32,
}

impl UsageRecord {
    pub fn new(user_id: impl Into<String>, date: NaiveDate, daily_limit: u32) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            requests_made: 0,
            daily_limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.requests_made)
    }
}

/// Response of `GET /ai/usage` and result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatus {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub remaining_requests: u32,
    pub daily_limit: u32,
}

impl UsageStatus {
    pub fn allowed(remaining_requests: u32, daily_limit: u32) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining_requests,
            daily_limit,
        }
    }

    pub fn denied(reason: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining_requests: 0,
            daily_limit,
        }
    }
}
