//! Geocode cache: normalized address keys and an in-memory store with expiry.

use std::time::Duration;

use fxhash::FxHashMap;
use jiff::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::Coordinate;
use crate::traits::{GeocodeCache, GeocodeMatch};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Builds the cache key for an address: trimmed, case-folded, punctuation
/// replaced by spaces and runs of whitespace collapsed.
///
/// `"12 Main St."`, `" 12  main st "` and `"12, Main-St"` share one key.
pub fn normalize_address(address: &str) -> String {
    let mut key = String::with_capacity(address.len());
    let mut pending_space = false;

    for ch in address.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    key
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeEntry {
    pub key: String,
    pub coordinate: Coordinate,
    pub formatted_address: String,
    pub confidence: f64,
    pub resolved_at: Timestamp,
    pub ttl: Duration,
}

impl GeocodeEntry {
    pub fn new(key: impl Into<String>, result: &GeocodeMatch, resolved_at: Timestamp, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            coordinate: result.coordinate,
            formatted_address: result.formatted_address.clone(),
            confidence: result.confidence,
            resolved_at,
            ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        let age_ms = now.as_millisecond().saturating_sub(self.resolved_at.as_millisecond());
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        age_ms >= ttl_ms
    }

    pub fn to_match(&self) -> GeocodeMatch {
        GeocodeMatch {
            coordinate: self.coordinate,
            formatted_address: self.formatted_address.clone(),
            confidence: self.confidence,
        }
    }
}

/// Concurrent in-process cache. Each insert replaces the whole entry under
/// the write lock, so readers never observe a partial update.
#[derive(Debug, Default)]
pub struct InMemoryGeocodeCache {
    entries: RwLock<FxHashMap<String, GeocodeEntry>>,
}

impl InMemoryGeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes stale entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Timestamp::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

impl GeocodeCache for InMemoryGeocodeCache {
    fn get(&self, key: &str) -> Option<GeocodeEntry> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Timestamp::now()))
            .cloned()
    }

    fn put(&self, entry: GeocodeEntry) {
        self.entries.write().insert(entry.key.clone(), entry);
    }

    fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}
