//! Contracts for the node's external collaborators.
//!
//! The DHT core is transport-agnostic. Everything it needs from its
//! surroundings enters through the traits in this module:
//!
//! | Trait | Provided by | Purpose |
//! |-------|-------------|---------|
//! | [`Host`] | embedder | stream dialing, connectedness oracle, own identity |
//! | [`AddressBook`] | embedder or [`MemoryAddressBook`] | peer → multiaddress mapping with TTLs |
//! | [`Validator`] | application | accept/reject records, order competing values |
//! | [`RandomSource`] | embedder or [`OsRandom`] | random bytes for walk targets |
//!
//! Inbound stream registration is inverted: the embedder routes streams
//! negotiated for the configured protocol ids to
//! [`Dht::handle_inbound_stream`](crate::Dht::handle_inbound_stream).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::error::DhtError;
use crate::identity::{PeerId, PeerInfo};
use crate::messages::Connectedness;

/// Peers the in-memory address book will track before evicting by LRU.
const ADDRESS_BOOK_CAPACITY: usize = 4096;

/// Object-safe alias for a duplex byte stream.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamIo for T {}

/// A negotiated bidirectional byte stream to a remote peer.
pub type DhtStream = Box<dyn StreamIo>;

/// The host node: dials streams, knows who we are, and keeps a cached
/// verdict on peer reachability.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Open a fresh stream to `peer` for one of the given protocols.
    async fn open_stream(&self, peer: &PeerId, protocols: &[String]) -> Result<DhtStream, DhtError>;

    /// The host's cached verdict on reachability of `info`.
    fn connectedness(&self, info: &PeerInfo) -> Connectedness;

    /// This node's own identity and listen addresses.
    fn self_info(&self) -> PeerInfo;
}

/// Peer → multiaddress mapping with per-entry TTLs.
///
/// `ttl` of `None` marks addresses permanent; permanence latches across
/// later upserts.
pub trait AddressBook: Send + Sync + 'static {
    /// Merge addresses for a peer. Returns `true` if the peer was new or
    /// gained at least one address.
    fn upsert(&self, peer: &PeerId, addrs: &[String], ttl: Option<Duration>) -> bool;

    /// Current unexpired addresses of a peer. Empty when unknown or expired.
    fn addresses_of(&self, peer: &PeerId) -> Vec<String>;

    /// Drop expired entries.
    fn remove_expired(&self);
}

/// External policy over stored values: admission and ordering.
pub trait Validator: Send + Sync + 'static {
    /// Accept or reject a (key, value) pair.
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), DhtError>;

    /// Pick the best of several accepted values for one key. Returns an
    /// index into `values`; callers guarantee `values` is non-empty.
    fn select(&self, key: &[u8], values: &[&[u8]]) -> usize;
}

/// Nonblocking source of random bytes.
pub trait RandomSource: Send + Sync + 'static {
    fn fill(&self, buf: &mut [u8]);
}

// ============================================================================
// Bundled default implementations
// ============================================================================

struct BookEntry {
    addrs: Vec<String>,
    /// `None` marks a permanent entry.
    expires_at: Option<Instant>,
}

/// In-memory [`AddressBook`] with LRU-bounded capacity.
pub struct MemoryAddressBook {
    entries: Mutex<LruCache<PeerId, BookEntry>>,
}

impl MemoryAddressBook {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(ADDRESS_BOOK_CAPACITY).expect("capacity must be non-zero");
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }
}

impl Default for MemoryAddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressBook for MemoryAddressBook {
    fn upsert(&self, peer: &PeerId, addrs: &[String], ttl: Option<Duration>) -> bool {
        if addrs.is_empty() {
            return false;
        }
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().expect("address book mutex poisoned");

        match entries.get_mut(peer) {
            Some(entry) => {
                let mut changed = false;
                for addr in addrs {
                    if !entry.addrs.contains(addr) {
                        entry.addrs.push(addr.clone());
                        changed = true;
                    }
                }
                // Permanence latches; otherwise keep the later deadline.
                entry.expires_at = match (entry.expires_at, expires_at) {
                    (None, _) | (_, None) => None,
                    (Some(old), Some(new)) => Some(old.max(new)),
                };
                changed
            }
            None => {
                entries.put(
                    *peer,
                    BookEntry {
                        addrs: addrs.to_vec(),
                        expires_at,
                    },
                );
                true
            }
        }
    }

    fn addresses_of(&self, peer: &PeerId) -> Vec<String> {
        let mut entries = self.entries.lock().expect("address book mutex poisoned");
        match entries.get(peer) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
                    entries.pop(peer);
                    Vec::new()
                } else {
                    entry.addrs.clone()
                }
            }
            None => Vec::new(),
        }
    }

    fn remove_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("address book mutex poisoned");
        let expired: Vec<PeerId> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some_and(|at| now >= at))
            .map(|(peer, _)| *peer)
            .collect();
        for peer in expired {
            entries.pop(&peer);
        }
    }
}

/// Validator that admits every record and prefers the newest value.
pub struct AcceptAllValidator;

impl Validator for AcceptAllValidator {
    fn validate(&self, _key: &[u8], _value: &[u8]) -> Result<(), DhtError> {
        Ok(())
    }

    fn select(&self, _key: &[u8], values: &[&[u8]]) -> usize {
        values.len().saturating_sub(1)
    }
}

/// [`RandomSource`] backed by the operating system.
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        getrandom::getrandom(buf).expect("OS randomness unavailable");
    }
}
