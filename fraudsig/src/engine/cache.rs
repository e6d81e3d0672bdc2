// fraudsig/src/engine/cache.rs
//
// TTL-bounded signature memoization, keyed by account id.
//
// - Lazy invalidation: an entry older than the TTL reads as a miss and is
//   removed on the spot; no background task is required for correctness.
// - Bounded: once past capacity, the oldest-created entries are evicted.
//   Large caches evict down to 90% in one sweep so the scan amortizes.
// - DashMap shards keep different accounts independent.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::events::FraudSignature;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub signature:  FraudSignature,
    pub created_at: DateTime<Utc>,
}

pub struct SignatureCache {
    entries:  DashMap<String, CacheEntry>,
    ttl:      Duration,
    capacity: usize,

    pub hits:      AtomicU64,
    pub misses:    AtomicU64,
    pub evictions: AtomicU64,
}

impl SignatureCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries:   DashMap::new(),
            ttl,
            capacity:  capacity.max(1),
            hits:      AtomicU64::new(0),
            misses:    AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(Duration::seconds(cfg.cache_ttl_secs), cfg.cache_capacity)
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn get(&self, account_id: &str) -> Option<FraudSignature> {
        self.get_at(account_id, Utc::now())
    }

    pub fn get_at(&self, account_id: &str, now: DateTime<Utc>) -> Option<FraudSignature> {
        let fresh = match self.entries.get(account_id) {
            Some(e) if now - e.created_at < self.ttl => Some(e.signature.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match fresh {
            Some(sig) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(sig)
            }
            None => {
                // Stale: drop it unless a concurrent put already replaced it
                self.entries.remove_if(account_id, |_, e| now - e.created_at >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, account_id: &str, signature: FraudSignature) {
        self.put_at(account_id, signature, Utc::now());
    }

    pub fn put_at(&self, account_id: &str, signature: FraudSignature, now: DateTime<Utc>) {
        self.entries.insert(account_id.to_string(), CacheEntry { signature, created_at: now });
        if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let target = self.capacity - self.capacity / 10;
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut ages: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|e| (e.created_at, e.key().clone()))
            .collect();
        ages.sort();

        for (_, key) in ages.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        self.evictions.fetch_add(excess as u64, Ordering::Relaxed);
        debug!("Signature cache evicted {} oldest entries", excess);
    }

    pub fn invalidate(&self, account_id: &str) -> bool {
        self.entries.remove(account_id).is_some()
    }

    /// Drop every expired entry. Optional housekeeping; reads never need it.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| now - e.created_at < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) { self.entries.clear(); }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
