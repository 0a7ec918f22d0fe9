//! Explanation cache.
//!
//! One record per (stock code, chart period). Generation for a key is
//! serialized through a per-key async lock, so concurrent misses on the same
//! key produce a single record; other keys are never blocked.
//!
//! Storage:
//! - DashMap: live records (sharded, read without waiting on generation)
//! - Redis: optional write-through copy, reloaded on startup

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::types::{ExplanationKey, ExplanationRecord};

const REDIS_EXPLANATION_PREFIX: &str = "kotori:explanation:";

/// Outcome of a cached lookup-or-generate.
#[derive(Debug, Clone)]
pub enum Cached {
    /// An unexpired record already existed.
    Hit(ExplanationRecord),
    /// This call generated and stored the record.
    Fresh(ExplanationRecord),
}

impl Cached {
    pub fn record(&self) -> &ExplanationRecord {
        match self {
            Cached::Hit(r) | Cached::Fresh(r) => r,
        }
    }

    pub fn into_record(self) -> ExplanationRecord {
        match self {
            Cached::Hit(r) | Cached::Fresh(r) => r,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Cached::Hit(_))
    }
}

/// Entry counts reported by [`ExplanationCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// A caller's hold on a key's generation lock.
///
/// Dropping it removes the map entry once no other caller holds the lock,
/// including when the owning future is cancelled mid-generation.
struct InflightSlot<'a> {
    inflight: &'a DashMap<ExplanationKey, Arc<Mutex<()>>>,
    key: &'a ExplanationKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn enter(inflight: &'a DashMap<ExplanationKey, Arc<Mutex<()>>>, key: &'a ExplanationKey) -> Self {
        let lock = inflight.entry(key.clone()).or_default().clone();
        Self {
            inflight,
            key,
            lock,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // The map and this slot are the only holders
        self.inflight
            .remove_if(self.key, |_, l| Arc::strong_count(l) == 2);
    }
}

pub struct ExplanationCache {
    records: DashMap<ExplanationKey, ExplanationRecord>,
    /// Per-key generation locks; an entry exists only while a generation may be running.
    inflight: DashMap<ExplanationKey, Arc<Mutex<()>>>,
    ttl: chrono::Duration,
    redis: RwLock<Option<ConnectionManager>>,
}

impl ExplanationCache {
    pub fn new(ttl: chrono::Duration) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            inflight: DashMap::new(),
            ttl,
            redis: RwLock::new(None),
        })
    }

    /// Lifetime given to new records.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Read an unexpired record. Never waits on a running generation.
    pub fn get(&self, key: &ExplanationKey) -> Option<ExplanationRecord> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &ExplanationKey, now: DateTime<Utc>) -> Option<ExplanationRecord> {
        let entry = self.records.get(key)?;
        if !entry.is_expired_at(now) {
            return Some(entry.value().clone());
        }
        drop(entry);
        self.records.remove_if(key, |_, r| r.is_expired_at(now));
        None
    }

    /// Return the cached record for `key`, or run `generate` and store its result.
    ///
    /// At most one `generate` runs per key at a time; callers arriving while it
    /// runs wait and then receive the stored record. If `generate` fails nothing
    /// is stored and the error is returned.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &ExplanationKey,
        generate: F,
    ) -> Result<Cached, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExplanationRecord, E>>,
    {
        if let Some(record) = self.get(key) {
            return Ok(Cached::Hit(record));
        }

        let slot = InflightSlot::enter(&self.inflight, key);
        let _guard = slot.lock.lock().await;

        // Someone else may have finished while we waited
        if let Some(record) = self.get(key) {
            return Ok(Cached::Hit(record));
        }

        let stored = self.insert_if_vacant(generate().await?);
        if let Cached::Fresh(ref record) = stored {
            self.persist(record).await;
        }
        Ok(stored)
    }

    /// Compare-and-set: store `record` only if no unexpired record holds its key.
    fn insert_if_vacant(&self, record: ExplanationRecord) -> Cached {
        let now = Utc::now();
        let mut slot = self.records.entry(record.key()).or_insert_with(|| record.clone());
        if slot.id == record.id {
            return Cached::Fresh(record);
        }
        if slot.is_expired_at(now) {
            *slot = record.clone();
            return Cached::Fresh(record);
        }
        Cached::Hit(slot.clone())
    }

    /// Drop expired records, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_expired_at(now));
        before.saturating_sub(self.records.len())
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let total = self.records.len();
        let valid = self
            .records
            .iter()
            .filter(|r| !r.is_expired_at(now))
            .count();
        CacheStats {
            total,
            valid,
            expired: total - valid,
        }
    }

    /// Connect to Redis for persistence.
    pub async fn connect_redis(&self, redis_url: &str) {
        match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    info!("ExplanationCache connected to Redis at {}", redis_url);
                    *self.redis.write().await = Some(conn);
                }
                Err(e) => {
                    warn!(
                        "Failed to connect ExplanationCache to Redis: {}. Explanations will not persist.",
                        e
                    );
                }
            },
            Err(e) => {
                warn!("Invalid Redis URL: {}. Explanations will not persist.", e);
            }
        }
    }

    fn redis_key(key: &ExplanationKey) -> String {
        format!(
            "{}{}:{}",
            REDIS_EXPLANATION_PREFIX, key.stock_code, key.chart_period
        )
    }

    /// Write a record to Redis with a TTL equal to its remaining lifetime.
    async fn persist(&self, record: &ExplanationRecord) {
        let conn_guard = self.redis.read().await;
        let Some(ref conn) = *conn_guard else {
            return;
        };

        let remaining = (record.expires_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            return;
        }

        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize explanation {}: {}", record.id, e);
                return;
            }
        };

        let mut conn = conn.clone();
        if let Err(e) = redis::cmd("SET")
            .arg(Self::redis_key(&record.key()))
            .arg(json)
            .arg("EX")
            .arg(remaining)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("Failed to persist explanation {}: {}", record.id, e);
        }
    }

    /// Load every persisted, unexpired record from Redis.
    pub async fn load_from_redis(&self) -> usize {
        let conn_guard = self.redis.read().await;
        let Some(ref conn) = *conn_guard else {
            return 0;
        };
        let mut conn = conn.clone();

        let keys: Vec<String> = match redis::cmd("KEYS")
            .arg(format!("{}*", REDIS_EXPLANATION_PREFIX))
            .query_async(&mut conn)
            .await
        {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list persisted explanations: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut loaded = 0;
        for key in keys {
            let value: Option<String> = match redis::cmd("GET").arg(&key).query_async(&mut conn).await {
                Ok(value) => value,
                Err(e) => {
                    debug!("Failed to read {}: {}", key, e);
                    continue;
                }
            };
            let Some(record) = value.and_then(|v| serde_json::from_str::<ExplanationRecord>(&v).ok())
            else {
                continue;
            };
            if record.is_expired_at(now) {
                continue;
            }
            if let Cached::Fresh(_) = self.insert_if_vacant(record) {
                loaded += 1;
            }
        }

        if loaded > 0 {
            info!("Loaded {} explanations from Redis", loaded);
        }
        loaded
    }
}
