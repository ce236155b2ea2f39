//! Peer identifiers and the XOR distance metric.
//!
//! This module defines the identifier types the routing layer is built on:
//!
//! - [`PeerId`]: opaque 32-byte peer identity, assigned by the host's
//!   transport layer
//! - [`NodeId`]: the peer's or a content key's position in the 256-bit XOR
//!   metric space, derived by SHA-256
//! - [`Distance`]: XOR of two node ids, ordered unsigned byte-lexicographic
//! - [`PeerInfo`]: a peer id together with its known multiaddresses
//!
//! ## Distance model
//!
//! `distance(a, b) = a XOR b`. The bucket index of a peer against the local
//! node is the length of the common bit prefix of their node ids: bucket 0
//! holds the farthest half of the keyspace, bucket 255 peers differing only
//! in the last bit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque content key, as supplied by the application.
pub type Key = Vec<u8>;

/// A 32-byte peer identity.
///
/// The DHT never interprets these bytes; identity assignment and
/// authentication belong to the host's transport layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for PeerId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A point in the 256-bit XOR metric space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Derive the node id of a peer: SHA-256 over the peer id bytes.
    pub fn from_peer(peer: &PeerId) -> Self {
        Self::from_key(peer.as_bytes())
    }

    /// Derive the node id of a content key: SHA-256 over the key bytes.
    pub fn from_key(key: &[u8]) -> Self {
        let digest = Sha256::digest(key);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// XOR distance to another node id.
    #[inline]
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", &hex::encode(self.0)[..16])
    }
}

/// XOR distance between two node ids.
///
/// Ordering is unsigned lexicographic on the bytes, so `Distance` sorts
/// ascending from closest to farthest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; 32]);

impl Distance {
    /// The maximum representable distance. Useful as a watermark seed.
    pub const MAX: Distance = Distance([0xff; 32]);

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Number of leading zero bits, i.e. the common prefix length of the two
    /// ids this distance was computed from.
    pub fn leading_zero_bits(&self) -> usize {
        for (byte_idx, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return byte_idx * 8 + byte.leading_zeros() as usize;
            }
        }
        256
    }
}

impl std::fmt::Debug for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Distance({})", &hex::encode(self.0)[..16])
    }
}

/// Bucket index of `other` relative to `local`: the position of the most
/// significant differing bit, clamped to [0, 255].
///
/// Identical ids (which never occur for distinct peers) clamp to 255.
pub fn bucket_index(local: &NodeId, other: &NodeId) -> usize {
    local.distance(other).leading_zero_bits().min(255)
}

/// A peer id together with its known multiaddresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<String>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<String>) -> Self {
        Self { id, addrs }
    }
}
