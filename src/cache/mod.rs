//! Kind-tagged TTL cache with market-hours-aware expiry.
//!
//! Every entry's effective TTL is fixed when it is written: the kind's base
//! TTL, multiplied by the closed-hours multiplier if the market is closed at
//! that instant. Reads only compare elapsed time against that stored TTL;
//! they never re-derive it from the current market state. Expired entries
//! read as misses but stay in the map until `sweep_expired` runs.
//!
//! The cache is a performance layer, not a correctness dependency: a corrupt
//! snapshot loads as an empty cache and every miss has a quote-source
//! fallback in the callers.

use crate::config::CacheConfig;
use crate::market::MarketHours;
use crate::persistence::StateStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// What an entry holds, which selects its base TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Price,
    History,
    Filter,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Price => "price",
            CacheKind::History => "history",
            CacheKind::Filter => "filter",
        }
    }

    fn base_ttl_secs(&self, config: &CacheConfig) -> i64 {
        match self {
            CacheKind::Price => config.price_ttl_secs,
            CacheKind::History => config.history_ttl_secs,
            CacheKind::Filter => config.filter_ttl_secs,
        }
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(CacheKind::Price),
            "history" => Ok(CacheKind::History),
            "filter" => Ok(CacheKind::Filter),
            other => Err(format!("unknown cache kind: {}", other)),
        }
    }
}

/// One immutable cache entry. Overwritten whole on `set`, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub kind: CacheKind,
    pub value: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    /// Effective TTL, multiplier already applied at write time
    pub ttl_secs: i64,
}

impl CacheEntry {
    /// Valid strictly before the TTL elapses; `elapsed >= ttl` is a miss.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.stored_at).num_seconds() >= self.ttl_secs
    }
}

/// Snapshot of cache occupancy for the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub price_entries: usize,
    pub history_entries: usize,
    pub filter_entries: usize,
    pub approx_size_bytes: usize,
    pub market_open: bool,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    writes_since_flush: u32,
}

/// The cache store. Reads are concurrent; every mutation takes the write
/// lock, keeping the single-writer discipline without blocking the runtime
/// (no await happens while a lock is held).
pub struct CacheStore {
    inner: RwLock<Inner>,
    store: Arc<StateStore>,
    config: CacheConfig,
    hours: MarketHours,
}

impl CacheStore {
    /// Build the cache, loading any persisted entries. An unreadable snapshot
    /// degrades to an empty cache; it never stops the process.
    pub fn new(config: CacheConfig, hours: MarketHours, store: Arc<StateStore>) -> Self {
        let entries = if config.enabled {
            match store.load_cache_entries() {
                Ok(loaded) => {
                    info!(entries = loaded.len(), "Loaded cache entries from disk");
                    loaded.into_iter().map(|e| (e.key.clone(), e)).collect()
                }
                Err(e) => {
                    warn!(error = %e, "Cache snapshot unreadable, starting with empty cache");
                    HashMap::new()
                }
            }
        } else {
            info!("Cache disabled, every lookup will hit the quote source");
            HashMap::new()
        };

        Self {
            inner: RwLock::new(Inner {
                entries,
                writes_since_flush: 0,
            }),
            store,
            config,
            hours,
        }
    }

    // Key scheme: "<kind>:<symbol>[:<params>]". `clear_symbol` relies on the
    // symbol being a whole colon-separated segment.

    pub fn price_key(symbol: &str) -> String {
        format!("price:{}", symbol)
    }

    pub fn history_key(symbol: &str, days: u32) -> String {
        format!("history:{}:{}d", symbol, days)
    }

    pub fn filter_key(min_price: Decimal) -> String {
        format!("filter:above:{}", min_price)
    }

    /// Fetch and deserialize a live entry. Expired or missing keys are misses;
    /// expired entries are left in place for the next sweep.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    fn get_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let inner = self.inner.read().unwrap();
        let entry = inner.entries.get(key)?;

        if entry.is_expired_at(now) {
            debug!(key, "Cache expired");
            return None;
        }

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Cached payload failed to deserialize, treating as miss");
                None
            }
        }
    }

    /// Store a value, stamping `stored_at` now and fixing the effective TTL
    /// from the market state at this instant.
    pub fn set<T: Serialize>(&self, key: &str, kind: CacheKind, value: &T) {
        self.set_at(key, kind, value, Utc::now());
    }

    fn set_at<T: Serialize>(&self, key: &str, kind: CacheKind, value: &T, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Value not serializable, skipping cache write");
                return;
            }
        };

        let mut ttl_secs = kind.base_ttl_secs(&self.config);
        if !self.hours.is_open_at(now) {
            ttl_secs *= self.config.market_closed_multiplier;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            kind,
            value,
            stored_at: now,
            ttl_secs,
        };

        let should_flush = {
            let mut inner = self.inner.write().unwrap();
            inner.entries.insert(key.to_string(), entry);
            inner.writes_since_flush += 1;
            debug!(key, ttl_secs, "Cache set");

            if inner.writes_since_flush >= self.config.flush_every_writes {
                inner.writes_since_flush = 0;
                true
            } else {
                false
            }
        };

        if should_flush {
            self.persist();
        }
    }

    /// Remove every expired entry. Invoked once per scan cycle so reads stay
    /// cheap and deletion I/O stays bounded.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| !entry.is_expired_at(now));
            before - inner.entries.len()
        };

        if removed > 0 {
            info!(removed, "Swept expired cache entries");
            self.persist();
        }

        removed
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap();

        let mut stats = CacheStats {
            total_entries: inner.entries.len(),
            price_entries: 0,
            history_entries: 0,
            filter_entries: 0,
            approx_size_bytes: 0,
            market_open: self.hours.is_open_now(),
        };

        for entry in inner.entries.values() {
            match entry.kind {
                CacheKind::Price => stats.price_entries += 1,
                CacheKind::History => stats.history_entries += 1,
                CacheKind::Filter => stats.filter_entries += 1,
            }
            stats.approx_size_bytes += entry.key.len() + entry.value.to_string().len();
        }

        stats
    }

    /// Drop every entry.
    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            let count = inner.entries.len();
            inner.entries.clear();
            count
        };
        info!(removed, "Cleared all cache entries");
        self.persist();
        removed
    }

    /// Drop every entry whose key references the symbol.
    pub fn clear_symbol(&self, symbol: &str) -> usize {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            let before = inner.entries.len();
            inner
                .entries
                .retain(|key, _| !key.split(':').any(|segment| segment == symbol));
            before - inner.entries.len()
        };

        if removed > 0 {
            info!(symbol, removed, "Cleared cache entries for symbol");
            self.persist();
        }

        removed
    }

    /// Write the current entries to disk. Called on the debounce schedule and
    /// at teardown; a failed flush is logged, never fatal.
    pub fn flush(&self) {
        self.persist();
    }

    fn persist(&self) {
        if !self.config.enabled {
            return;
        }

        let entries: Vec<CacheEntry> = {
            let inner = self.inner.read().unwrap();
            inner.entries.values().cloned().collect()
        };

        if let Err(e) = self.store.save_cache_entries(&entries) {
            warn!(error = %e, "Failed to persist cache entries");
        } else {
            debug!(entries = entries.len(), "Persisted cache entries");
        }
    }
}
