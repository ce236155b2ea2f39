//! Provider index and value store.
//!
//! Both tables are plain in-memory maps owned by the DHT actor; expiry is
//! checked on read and enforced in bulk by the periodic GC tick. Expired
//! entries are never visible to callers even before the sweep runs.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DhtError;
use crate::host::Validator;
use crate::identity::{Key, PeerId};

// ============================================================================
// Provider routing table
// ============================================================================

#[derive(Clone, Debug)]
struct ProviderEntry {
    peer: PeerId,
    /// `None` marks a permanent record (our own provides).
    expires_at: Option<Instant>,
}

impl ProviderEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Key → ordered set of provider peers with expiry.
///
/// Per-key and global entry counts are capped; overflow evicts the
/// earliest-expiring entry, which degenerates to FIFO under a uniform TTL.
#[derive(Debug)]
pub struct ProviderRoutingTable {
    entries: HashMap<Key, VecDeque<ProviderEntry>>,
    total: usize,
    max_per_key: usize,
    max_total: usize,
}

impl ProviderRoutingTable {
    pub fn new(max_per_key: usize, max_total: usize) -> Self {
        Self {
            entries: HashMap::new(),
            total: 0,
            max_per_key: max_per_key.max(1),
            max_total: max_total.max(1),
        }
    }

    /// Record that `peer` provides `key`. `ttl` of `None` marks the record
    /// permanent; permanence latches on re-announcement.
    pub fn add(&mut self, key: Key, peer: PeerId, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let providers = self.entries.entry(key).or_default();

        if let Some(existing) = providers.iter_mut().find(|e| e.peer == peer) {
            existing.expires_at = match (existing.expires_at, expires_at) {
                (None, _) | (_, None) => None,
                (Some(old), Some(new)) => Some(old.max(new)),
            };
            return;
        }

        providers.push_back(ProviderEntry { peer, expires_at });
        self.total += 1;

        if providers.len() > self.max_per_key {
            Self::evict_earliest(providers);
            self.total -= 1;
        }
        if self.total > self.max_total {
            self.evict_earliest_global();
        }
    }

    fn evict_earliest(providers: &mut VecDeque<ProviderEntry>) {
        let victim = providers
            .iter()
            .enumerate()
            .min_by_key(|(pos, e)| (e.expires_at.is_none(), e.expires_at, *pos))
            .map(|(pos, _)| pos);
        if let Some(pos) = victim {
            providers.remove(pos);
        }
    }

    fn evict_earliest_global(&mut self) {
        let victim_key = self
            .entries
            .iter()
            .filter(|(_, providers)| !providers.is_empty())
            .min_by_key(|(_, providers)| {
                providers
                    .iter()
                    .map(|e| (e.expires_at.is_none(), e.expires_at))
                    .min()
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim_key {
            if let Some(providers) = self.entries.get_mut(&key) {
                Self::evict_earliest(providers);
                self.total -= 1;
                if providers.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Unexpired providers of `key` in announcement order, up to `limit`.
    pub fn providers_of(&self, key: &[u8], limit: Option<usize>) -> Vec<PeerId> {
        let now = Instant::now();
        let limit = limit.unwrap_or(usize::MAX);
        self.entries
            .get(key)
            .map(|providers| {
                providers
                    .iter()
                    .filter(|e| !e.is_expired(now))
                    .map(|e| e.peer)
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop expired entries and keys left without providers.
    pub fn gc(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, providers| {
            providers.retain(|e| !e.is_expired(now));
            !providers.is_empty()
        });
        self.total = self.entries.values().map(|p| p.len()).sum();
    }

    /// Number of keys with at least one recorded provider.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Total provider entries, expired ones included until the next sweep.
    pub fn entry_count(&self) -> usize {
        self.total
    }
}

// ============================================================================
// Value store
// ============================================================================

#[derive(Clone, Debug)]
struct StoredValue {
    value: Vec<u8>,
    received_at_secs: u64,
    expires_at: Instant,
}

/// Key → (value, expiry) with validator-gated writes.
#[derive(Debug)]
pub struct ValueStore {
    entries: HashMap<Key, StoredValue>,
    ttl: Duration,
    max_value_size: usize,
}

impl ValueStore {
    pub fn new(ttl: Duration, max_value_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_value_size,
        }
    }

    /// Store a value if the validator admits it and does not prefer the
    /// currently stored one. Returns `Ok(true)` when the stored value
    /// changed.
    pub fn put(
        &mut self,
        validator: &dyn Validator,
        key: Key,
        value: Vec<u8>,
        received_at_secs: u64,
    ) -> Result<bool, DhtError> {
        if value.len() > self.max_value_size {
            return Err(DhtError::ValidationRejected);
        }
        validator.validate(&key, &value)?;

        let now = Instant::now();
        if let Some(existing) = self.entries.get(&key) {
            if now < existing.expires_at {
                let candidates: [&[u8]; 2] = [&existing.value, &value];
                if validator.select(&key, &candidates) == 0 {
                    return Ok(false);
                }
            }
        }

        self.entries.insert(
            key,
            StoredValue {
                value,
                received_at_secs,
                expires_at: now + self.ttl,
            },
        );
        Ok(true)
    }

    /// The stored value and its receive stamp, if present and unexpired.
    pub fn get(&mut self, key: &[u8]) -> Option<(Vec<u8>, u64)> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(stored) if now < stored.expires_at => {
                Some((stored.value.clone(), stored.received_at_secs))
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drop expired entries.
    pub fn gc(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, stored| now < stored.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
