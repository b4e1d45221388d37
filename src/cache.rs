// src/cache.rs
//! Resolution cache shared by every worker of a scan.
//!
//! One type, two eviction policies. The unbounded policy is a plain concurrent
//! map and suits small scans; the LRU policy bounds memory for large or
//! recursive scans and expires entries after a TTL, lazily on read and
//! proactively through a background sweep.

use crate::types::{CacheConfig, ResolutionOutcome};
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum CachePolicy {
    Unbounded,
    LruTtl { capacity: usize, ttl: Duration },
}

impl CachePolicy {
    /// Picks the policy once, from the number of candidates a run expects.
    pub fn for_volume(expected_candidates: usize, threshold: usize, config: &CacheConfig) -> Self {
        if expected_candidates > threshold {
            CachePolicy::LruTtl {
                capacity: config.capacity,
                ttl: config.ttl,
            }
        } else {
            CachePolicy::Unbounded
        }
    }
}

pub struct ResolutionCache {
    store: Store,
}

enum Store {
    Unbounded(DashMap<String, ResolutionOutcome>),
    Lru(Cache<String, ResolutionOutcome>),
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let policy = match &self.store {
            Store::Unbounded(_) => "unbounded",
            Store::Lru(_) => "lru-ttl",
        };
        f.debug_struct("ResolutionCache")
            .field("policy", &policy)
            .field("len", &self.len())
            .finish()
    }
}

impl ResolutionCache {
    pub fn new(policy: CachePolicy) -> Self {
        let store = match policy {
            CachePolicy::Unbounded => Store::Unbounded(DashMap::new()),
            CachePolicy::LruTtl { capacity, ttl } => Store::Lru(
                Cache::builder()
                    .max_capacity(capacity.max(1) as u64)
                    .time_to_live(ttl)
                    .eviction_policy(EvictionPolicy::lru())
                    .build(),
            ),
        };
        Self { store }
    }

    pub fn unbounded() -> Self {
        Self::new(CachePolicy::Unbounded)
    }

    pub fn lru(capacity: usize, ttl: Duration) -> Self {
        Self::new(CachePolicy::LruTtl { capacity, ttl })
    }

    /// Returns the cached outcome and refreshes its recency. Entries past
    /// their TTL read as a miss even before the sweep removes them.
    pub fn load(&self, key: &str) -> Option<ResolutionOutcome> {
        match &self.store {
            Store::Unbounded(map) => map.get(key).map(|entry| entry.value().clone()),
            Store::Lru(cache) => cache.get(key),
        }
    }

    /// Last write wins when two workers store the same key.
    pub fn store(&self, key: &str, outcome: ResolutionOutcome) {
        match &self.store {
            Store::Unbounded(map) => {
                map.insert(key.to_string(), outcome);
            }
            Store::Lru(cache) => {
                cache.insert(key.to_string(), outcome);
                // Apply the eviction right away so capacity is never exceeded
                // between sweeps.
                cache.run_pending_tasks();
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        match &self.store {
            Store::Unbounded(map) => map.len(),
            Store::Lru(cache) => {
                cache.run_pending_tasks();
                cache.entry_count() as usize
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries and applies pending evictions.
    pub fn purge_expired(&self) {
        if let Store::Lru(cache) = &self.store {
            cache.run_pending_tasks();
        }
    }

    /// Starts the periodic expiry sweep. The task holds only a weak
    /// reference and ends once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if matches!(self.store, Store::Unbounded(_)) || interval.is_zero() {
            return None;
        }

        let cache: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => cache.purge_expired(),
                    None => break,
                }
            }
        }))
    }
}
