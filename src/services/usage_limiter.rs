//! Usage limiter for explanation generation.
//!
//! Two layers of ceilings, both checked before a generation starts:
//! - per user per UTC day (`user_daily_limit`)
//! - app-wide per day, per minute, and tokens per minute, which keep the
//!   language model account inside its provider quota
//!
//! Tokens are reserved at an estimate on admission and settled to the count
//! the backend reports once the generation finishes.
//!
//! User records live in a sharded DashMap and are updated under that user's
//! entry lock. App-wide windows are packed atomics (window id + count), so no
//! lock is shared between users.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::types::{UsageRecord, UsageStatus};

pub const USER_LIMIT_REASON: &str = "Daily user limit exceeded";
pub const APP_DAILY_REASON: &str = "Daily request limit exceeded";
pub const APP_MINUTE_REASON: &str = "Rate limit exceeded, please try again later";
pub const APP_TOKEN_REASON: &str = "Token rate limit exceeded";

/// Quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsagePolicy {
    pub user_daily_limit: u32,
    pub app_daily_requests: u32,
    pub app_minute_requests: u32,
    pub app_minute_tokens: u32,
    /// Token estimate reserved per generation.
    pub tokens_per_request: u32,
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            user_daily_limit: 10,
            // 85% of the provider's free tier
            app_daily_requests: 170,
            app_minute_requests: 25,
            app_minute_tokens: 850_000,
            tokens_per_request: 650,
        }
    }
}

/// Counter for a fixed time window.
///
/// High 32 bits hold the window id, low 32 bits the count; a different window
/// id means the count is implicitly zero.
#[derive(Debug, Default)]
struct WindowCounter {
    packed: AtomicU64,
}

fn pack(window: u32, count: u32) -> u64 {
    ((window as u64) << 32) | count as u64
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

impl WindowCounter {
    fn count(&self, window: u32) -> u32 {
        match unpack(self.packed.load(Ordering::Acquire)) {
            (w, count) if w == window => count,
            _ => 0,
        }
    }

    /// Add `amount` to the window if `admit(current_count)` allows it.
    fn try_add<E>(
        &self,
        window: u32,
        amount: u32,
        admit: impl Fn(u32) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut rejection = None;
        // The closure only returns None after recording a rejection
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                let count = match unpack(packed) {
                    (w, count) if w == window => count,
                    _ => 0,
                };
                match admit(count) {
                    Ok(()) => Some(pack(window, count.saturating_add(amount))),
                    Err(e) => {
                        rejection = Some(e);
                        None
                    }
                }
            });

        rejection.map_or(Ok(()), Err)
    }

    /// Move the window's count from `from` to `to`, saturating at zero.
    /// No-op once the window has rolled over.
    fn settle(&self, window: u32, from: u32, to: u32) {
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| match unpack(packed) {
                (w, count) if w == window => {
                    let count = if to >= from {
                        count.saturating_add(to - from)
                    } else {
                        count.saturating_sub(from - to)
                    };
                    Some(pack(window, count))
                }
                _ => None,
            });
    }

    /// Undo an addition of `amount` in `window`.
    fn release(&self, window: u32, amount: u32) {
        self.settle(window, amount, 0);
    }
}

fn day_window(now: DateTime<Utc>) -> u32 {
    (now.timestamp().max(0) / 86_400) as u32
}

fn minute_window(now: DateTime<Utc>) -> u32 {
    (now.timestamp().max(0) / 60) as u32
}

/// Per-user daily generation limiter.
pub struct UsageLimiter {
    users: DashMap<String, UsageRecord>,
    app_daily: WindowCounter,
    app_minute: WindowCounter,
    app_minute_tokens: WindowCounter,
    policy: UsagePolicy,
}

impl UsageLimiter {
    pub fn new(policy: UsagePolicy) -> Self {
        Self {
            users: DashMap::new(),
            app_daily: WindowCounter::default(),
            app_minute: WindowCounter::default(),
            app_minute_tokens: WindowCounter::default(),
            policy,
        }
    }

    /// Admit one generation for `user_id`, charging its quota.
    pub fn check_and_increment(&self, user_id: &str) -> UsageStatus {
        self.check_and_increment_at(user_id, Utc::now())
    }

    pub fn check_and_increment_at(&self, user_id: &str, now: DateTime<Utc>) -> UsageStatus {
        let limit = self.policy.user_daily_limit;
        let today = now.date_naive();

        let mut record = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UsageRecord::new(user_id, today, limit));

        if record.date != today {
            *record = UsageRecord::new(user_id, today, limit);
        }

        if record.requests_made >= limit {
            debug!("User {} hit the daily limit ({})", user_id, limit);
            return UsageStatus::denied(USER_LIMIT_REASON, limit);
        }

        if let Err(reason) = self.reserve_app_slot(now) {
            debug!("App-wide quota denied generation for {}: {}", user_id, reason);
            return UsageStatus::denied(reason, limit);
        }

        record.requests_made += 1;
        UsageStatus::allowed(record.remaining(), limit)
    }

    /// Current quota for `user_id` without charging it.
    pub fn status(&self, user_id: &str) -> UsageStatus {
        self.status_at(user_id, Utc::now())
    }

    pub fn status_at(&self, user_id: &str, now: DateTime<Utc>) -> UsageStatus {
        let limit = self.policy.user_daily_limit;
        let made = self.requests_made_on(user_id, now.date_naive());

        if made >= limit {
            return UsageStatus::denied(USER_LIMIT_REASON, limit);
        }
        if let Err(reason) = self.app_admission(
            self.app_daily.count(day_window(now)),
            self.app_minute.count(minute_window(now)),
            self.tokens_in_minute(now),
        ) {
            return UsageStatus::denied(reason, limit);
        }

        UsageStatus::allowed(limit - made, limit)
    }

    /// Generations `user_id` has made on `date` (zero when no record exists).
    pub fn requests_made_on(&self, user_id: &str, date: NaiveDate) -> u32 {
        self.users
            .get(user_id)
            .filter(|r| r.date == date)
            .map(|r| r.requests_made)
            .unwrap_or(0)
    }

    /// Replace the token estimate reserved for a generation admitted at
    /// `admitted_at` with the count the backend reported.
    ///
    /// Has no effect once that minute is over.
    pub fn record_tokens(&self, admitted_at: DateTime<Utc>, tokens_used: u32) {
        let estimate = self.policy.tokens_per_request;
        self.app_minute_tokens
            .settle(minute_window(admitted_at), estimate, tokens_used);
        debug!("Settled token reservation {} -> {}", estimate, tokens_used);
    }

    /// Tokens reserved or spent app-wide in the minute containing `now`.
    pub fn tokens_in_minute(&self, now: DateTime<Utc>) -> u32 {
        self.app_minute_tokens.count(minute_window(now))
    }

    fn app_admission(&self, daily: u32, minute: u32, tokens: u32) -> Result<(), &'static str> {
        let p = &self.policy;
        if daily >= p.app_daily_requests {
            return Err(APP_DAILY_REASON);
        }
        if minute >= p.app_minute_requests {
            return Err(APP_MINUTE_REASON);
        }
        if tokens as u64 + p.tokens_per_request as u64 > p.app_minute_tokens as u64 {
            return Err(APP_TOKEN_REASON);
        }
        Ok(())
    }

    fn reserve_app_slot(&self, now: DateTime<Utc>) -> Result<(), &'static str> {
        let p = self.policy;
        let day = day_window(now);
        let minute = minute_window(now);

        self.app_daily.try_add(day, 1, |count| {
            if count >= p.app_daily_requests {
                Err(APP_DAILY_REASON)
            } else {
                Ok(())
            }
        })?;

        if let Err(reason) = self.app_minute.try_add(minute, 1, |count| {
            if count >= p.app_minute_requests {
                Err(APP_MINUTE_REASON)
            } else {
                Ok(())
            }
        }) {
            self.app_daily.release(day, 1);
            return Err(reason);
        }

        let estimate = p.tokens_per_request;
        if let Err(reason) = self.app_minute_tokens.try_add(minute, estimate, |tokens| {
            if tokens as u64 + estimate as u64 > p.app_minute_tokens as u64 {
                Err(APP_TOKEN_REASON)
            } else {
                Ok(())
            }
        }) {
            self.app_minute.release(minute, 1);
            self.app_daily.release(day, 1);
            return Err(reason);
        }
        Ok(())
    }
}
