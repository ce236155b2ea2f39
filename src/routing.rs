//! XOR-metric peer routing table.
//!
//! 256 k-buckets of peer entries, indexed by the common-prefix length
//! between the local node id and the entry's node id. Within a bucket the
//! head is the most recently seen peer; eviction prefers the stalest entry
//! that is neither permanent (a bootstrap anchor) nor currently connected.
//!
//! Invariants:
//! - no peer appears twice, and the local peer never appears
//! - an entry's bucket always equals `bucket_index(local, entry)`
//! - bucket size stays at or under k unless every entry is permanent

use crate::error::DhtError;
use crate::host::RandomSource;
use crate::identity::{bucket_index, Distance, NodeId, PeerId};

const BUCKET_COUNT: usize = 256;

#[derive(Clone, Debug)]
struct BucketEntry {
    peer: PeerId,
    node_id: NodeId,
    is_permanent: bool,
    is_connected: bool,
}

/// One k-bucket. Index 0 is the head (most recently seen).
#[derive(Clone, Debug, Default)]
struct KBucket {
    entries: Vec<BucketEntry>,
}

impl KBucket {
    fn position(&self, peer: &PeerId) -> Option<usize> {
        self.entries.iter().position(|e| &e.peer == peer)
    }

    /// Stalest entry that is neither permanent nor connected, if any.
    fn evictable(&self) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| !e.is_permanent && !e.is_connected)
    }
}

/// Routing table over the 256-bit XOR metric space.
#[derive(Debug)]
pub struct PeerRoutingTable {
    local_peer: PeerId,
    local_id: NodeId,
    k: usize,
    buckets: Vec<KBucket>,
}

impl PeerRoutingTable {
    pub fn new(local_peer: PeerId, k: usize) -> Self {
        Self {
            local_peer,
            local_id: NodeId::from_peer(&local_peer),
            k,
            buckets: vec![KBucket::default(); BUCKET_COUNT],
        }
    }

    /// Record that `peer` was seen.
    ///
    /// Existing entries move to the head of their bucket; `is_permanent`
    /// latches true and `is_connected` takes the new value. A new peer is
    /// inserted at the head, evicting the stalest non-permanent,
    /// non-connected entry when the bucket is at capacity. Returns `Ok(true)`
    /// iff a new entry was inserted.
    pub fn update(
        &mut self,
        peer: PeerId,
        is_permanent: bool,
        is_connected: bool,
    ) -> Result<bool, DhtError> {
        if peer == self.local_peer {
            return Ok(false);
        }
        let node_id = NodeId::from_peer(&peer);
        let idx = bucket_index(&self.local_id, &node_id);
        let bucket = &mut self.buckets[idx];

        if let Some(pos) = bucket.position(&peer) {
            let mut entry = bucket.entries.remove(pos);
            entry.is_permanent |= is_permanent;
            entry.is_connected = is_connected;
            bucket.entries.insert(0, entry);
            return Ok(false);
        }

        let entry = BucketEntry {
            peer,
            node_id,
            is_permanent,
            is_connected,
        };

        if bucket.entries.len() < self.k {
            bucket.entries.insert(0, entry);
            return Ok(true);
        }

        match bucket.evictable() {
            Some(pos) => {
                bucket.entries.remove(pos);
                bucket.entries.insert(0, entry);
                Ok(true)
            }
            None => Err(DhtError::BucketFull),
        }
    }

    /// Whether the peer currently has an entry.
    pub fn contains(&self, peer: &PeerId) -> bool {
        let node_id = NodeId::from_peer(peer);
        let idx = bucket_index(&self.local_id, &node_id);
        self.buckets[idx].position(peer).is_some()
    }

    /// Remove a peer. Idempotent.
    pub fn remove(&mut self, peer: &PeerId) {
        let node_id = NodeId::from_peer(peer);
        let idx = bucket_index(&self.local_id, &node_id);
        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.position(peer) {
            bucket.entries.remove(pos);
        }
    }

    /// Flip the liveness flag of an existing entry without reordering or
    /// inserting. Returns `true` if the peer was present.
    pub fn set_connected(&mut self, peer: &PeerId, is_connected: bool) -> bool {
        let node_id = NodeId::from_peer(peer);
        let idx = bucket_index(&self.local_id, &node_id);
        match self.buckets[idx].position(peer) {
            Some(pos) => {
                self.buckets[idx].entries[pos].is_connected = is_connected;
                true
            }
            None => false,
        }
    }

    /// Up to `n` peers sorted by ascending distance to `target`.
    ///
    /// Walks buckets starting at the target's depth, where the closest
    /// entries live by construction, and expands outward only while the
    /// result is short: the target-depth bucket first, then all deeper
    /// buckets (every entry there sits at the same prefix depth relative to
    /// the target), then shallower buckets in decreasing depth, each one
    /// strictly farther than everything gathered before it.
    pub fn nearest(&self, target: &NodeId, n: usize) -> Vec<PeerId> {
        if n == 0 {
            return Vec::new();
        }
        let depth = bucket_index(&self.local_id, target);
        let mut result: Vec<(Distance, PeerId)> = Vec::new();

        let push_phase = |result: &mut Vec<(Distance, PeerId)>, buckets: &[usize]| {
            if result.len() >= n {
                return;
            }
            let mut phase: Vec<(Distance, PeerId)> = buckets
                .iter()
                .flat_map(|&i| self.buckets[i].entries.iter())
                .map(|e| (e.node_id.distance(target), e.peer))
                .collect();
            phase.sort_by(|a, b| a.0.cmp(&b.0));
            result.extend(phase);
        };

        push_phase(&mut result, &[depth]);
        let deeper: Vec<usize> = (depth + 1..BUCKET_COUNT).collect();
        push_phase(&mut result, &deeper);
        for shallower in (0..depth).rev() {
            push_phase(&mut result, &[shallower]);
        }

        result.truncate(n);
        result.into_iter().map(|(_, peer)| peer).collect()
    }

    /// Total entries across all buckets.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// A uniformly chosen peer from bucket `index`, if the bucket is
    /// populated.
    pub fn random_peer_at_bucket(&self, index: usize, rng: &dyn RandomSource) -> Option<PeerId> {
        let bucket = self.buckets.get(index)?;
        if bucket.entries.is_empty() {
            return None;
        }
        let mut raw = [0u8; 8];
        rng.fill(&mut raw);
        let pick = u64::from_le_bytes(raw) as usize % bucket.entries.len();
        Some(bucket.entries[pick].peer)
    }

    #[cfg(test)]
    fn bucket_of(&self, peer: &PeerId) -> Option<usize> {
        self.buckets
            .iter()
            .position(|b| b.entries.iter().any(|e| &e.peer == peer))
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for (idx, bucket) in self.buckets.iter().enumerate() {
            for entry in &bucket.entries {
                assert!(seen.insert(entry.peer), "duplicate peer across buckets");
                assert_ne!(entry.peer, self.local_peer, "local peer in table");
                assert_eq!(
                    bucket_index(&self.local_id, &entry.node_id),
                    idx,
                    "entry filed under wrong bucket"
                );
            }
            let all_permanent = bucket.entries.iter().all(|e| e.is_permanent);
            assert!(
                bucket.entries.len() <= self.k || all_permanent,
                "bucket over capacity without permanence"
            );
        }
    }
}
