//! DHT node configuration.

use std::time::Duration;

/// Default bucket and result-set width.
pub const DEFAULT_K: usize = 20;

/// Default lookup concurrency factor.
pub const DEFAULT_ALPHA: usize = 3;

/// Protocol id announced to the host's protocol router by default.
pub const DEFAULT_PROTOCOL: &str = "/ipfs/kad/1.0.0";

/// Configuration for the DHT node.
#[derive(Clone, Debug)]
pub struct Config {
    // ========================================================================
    // Lookup Parameters
    // ========================================================================
    /// k - bucket width and query result-set size.
    pub k: usize,
    /// α - concurrent in-flight requests per lookup.
    pub alpha: usize,
    /// Peers attached to FindNode/GetProviders replies.
    pub closer_peer_count: usize,
    /// Peers that receive the selected record during GetValue fix-up.
    pub quorum: usize,
    /// Upper bound on queries issued by a single lookup, if any.
    pub max_lookup_queries: Option<usize>,
    /// Overall deadline for a single lookup, if any.
    pub lookup_deadline: Option<Duration>,

    // ========================================================================
    // Timeouts and Record Lifetimes
    // ========================================================================
    /// Per-request response deadline at the session level.
    pub response_timeout: Duration,
    /// Time-to-live of stored value records.
    pub max_record_age: Duration,
    /// Time-to-live of provider records learned from other peers.
    pub max_provider_age: Duration,
    /// Interval between provider/value garbage-collection sweeps.
    pub gc_interval: Duration,

    // ========================================================================
    // Resource Bounds
    // ========================================================================
    /// Maximum size of a stored value. Also bounds frame decoding.
    pub max_value_size: usize,
    /// Provider entries retained per key.
    pub max_providers_per_key: usize,
    /// Provider entries retained across all keys.
    pub max_provider_entries: usize,

    // ========================================================================
    // Discovery
    // ========================================================================
    /// Random-walk discovery cadence.
    pub random_walk: RandomWalkConfig,
    /// Protocol ids this node speaks; passed to `Host::open_stream` and
    /// expected of inbound streams routed to the node.
    pub protocols: Vec<String>,
}

/// Cadence of random-walk discovery lookups.
///
/// Each period runs `queries_per_period` walks spaced by `delay`, then
/// sleeps out the remainder of `interval`.
#[derive(Clone, Debug)]
pub struct RandomWalkConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub delay: Duration,
    pub queries_per_period: usize,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            delay: Duration::from_secs(10),
            queries_per_period: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            closer_peer_count: DEFAULT_K,
            quorum: 3,
            max_lookup_queries: Some(128),
            lookup_deadline: Some(Duration::from_secs(60)),
            response_timeout: Duration::from_secs(10),
            max_record_age: Duration::from_secs(24 * 60 * 60),
            max_provider_age: Duration::from_secs(24 * 60 * 60),
            gc_interval: Duration::from_secs(60),
            max_value_size: 1024 * 1024,
            max_providers_per_key: 32,
            max_provider_entries: 4096,
            random_walk: RandomWalkConfig::default(),
            protocols: vec![DEFAULT_PROTOCOL.to_string()],
        }
    }
}

impl Config {
    /// Check internal consistency. Called once when the node is spawned.
    pub fn validate(&self) -> Result<(), String> {
        if self.k == 0 {
            return Err("k must be at least 1".into());
        }
        if self.alpha == 0 {
            return Err("alpha must be at least 1".into());
        }
        if self.alpha > self.k {
            return Err("alpha must not exceed k".into());
        }
        if self.protocols.is_empty() {
            return Err("at least one protocol id is required".into());
        }
        if self.max_value_size == 0 {
            return Err("max_value_size must be non-zero".into());
        }
        if self.random_walk.enabled && self.random_walk.queries_per_period == 0 {
            return Err("random_walk.queries_per_period must be at least 1".into());
        }
        Ok(())
    }

    /// Candidate-set cap for a lookup, three result sets wide.
    pub(crate) fn candidate_cap(&self) -> usize {
        self.k * 3
    }
}
