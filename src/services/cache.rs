//! TTL cache for aggregated departure boards.
//!
//! Keyed by the sorted station set plus the line code, so two requests
//! naming the same stations in a different order share an entry. Expiry is
//! derived from the creation instant on every lookup, never stored as a
//! flag; an expired entry behaves exactly like a miss.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::models::DeparturesResult;

struct CacheEntry {
    payload: DeparturesResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < self.ttl
    }
}

/// Cache state exposed on the status surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheInfo {
    /// Whether an entry exists for the key, fresh or not
    pub has_data: bool,
    /// Whether that entry is still within its TTL
    pub is_valid: bool,
    /// Seconds since the entry was written, when one exists
    pub age_seconds: Option<u64>,
    /// TTL applied to the entry (or the default TTL when absent)
    pub duration_seconds: u64,
}

pub struct BoardCache {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl BoardCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cache key for a station set and line: lexicographically sorted,
    /// comma-joined station codes plus the line code. Order-insensitive,
    /// but any difference in the station set is a distinct key.
    pub fn key(stations: &[String], service_id: &str) -> String {
        let mut codes: Vec<&str> = stations.iter().map(String::as_str).collect();
        codes.sort_unstable();
        format!("{}:{}", codes.join(","), service_id)
    }

    /// Fresh payload for the key, or None. Expired entries are misses.
    pub fn get(&self, key: &str) -> Option<DeparturesResult> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_valid(Instant::now()) {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Replace the entry for the key wholesale. Concurrent writers race;
    /// the later write wins, which is fine within one TTL window.
    pub fn set(&self, key: &str, payload: DeparturesResult, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Seconds since the key's entry was written, while it is still fresh.
    pub fn age_seconds(&self, key: &str) -> Option<u64> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        let now = Instant::now();
        if entry.is_valid(now) {
            Some(now.duration_since(entry.created_at).as_secs())
        } else {
            None
        }
    }

    pub fn info(&self, key: &str) -> CacheInfo {
        let entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) => CacheInfo {
                has_data: true,
                is_valid: entry.is_valid(now),
                age_seconds: Some(now.duration_since(entry.created_at).as_secs()),
                duration_seconds: entry.ttl.as_secs(),
            },
            None => CacheInfo {
                has_data: false,
                is_valid: false,
                age_seconds: None,
                duration_seconds: self.default_ttl.as_secs(),
            },
        }
    }
}
