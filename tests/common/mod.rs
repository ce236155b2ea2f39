#![allow(dead_code)]

//! In-process simulated network for integration tests.
//!
//! Nodes are registered in a shared registry; dialing a peer hands the
//! remote node one end of a fresh in-memory duplex stream, exactly as a
//! real host would route an inbound protocol stream.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use rhizome::{
    Config, Connectedness, Dht, DhtError, DhtStream, Host, PeerId, PeerInfo, RandomWalkConfig,
};

#[derive(Default)]
pub struct NetworkRegistry {
    peers: RwLock<HashMap<PeerId, Dht<SimHost>>>,
    failures: RwLock<HashSet<PeerId>>,
    dials: AtomicUsize,
}

impl NetworkRegistry {
    pub fn register(&self, node: &Dht<SimHost>) {
        self.peers
            .write()
            .unwrap()
            .insert(node.self_peer(), node.clone());
    }

    pub fn get(&self, id: &PeerId) -> Option<Dht<SimHost>> {
        self.peers.read().unwrap().get(id).cloned()
    }

    /// Make dialing `id` fail with a transport error.
    pub fn set_failure(&self, id: PeerId, fail: bool) {
        let mut failures = self.failures.write().unwrap();
        if fail {
            failures.insert(id);
        } else {
            failures.remove(&id);
        }
    }

    pub fn is_failed(&self, id: &PeerId) -> bool {
        self.failures.read().unwrap().contains(id)
    }

    /// Total outbound stream opens across the whole network.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct SimHost {
    registry: Arc<NetworkRegistry>,
    self_info: PeerInfo,
}

impl SimHost {
    pub fn new(registry: Arc<NetworkRegistry>, self_info: PeerInfo) -> Self {
        Self {
            registry,
            self_info,
        }
    }
}

#[async_trait]
impl Host for SimHost {
    async fn open_stream(
        &self,
        peer: &PeerId,
        _protocols: &[String],
    ) -> Result<DhtStream, DhtError> {
        self.registry.dials.fetch_add(1, Ordering::Relaxed);
        if self.registry.is_failed(peer) {
            return Err(DhtError::TransportClosed);
        }
        let Some(remote) = self.registry.get(peer) else {
            return Err(DhtError::TransportClosed);
        };

        let (near, far) = tokio::io::duplex(256 * 1024);
        let caller = self.self_info.id;
        tokio::spawn(async move {
            remote.handle_inbound_stream(caller, Box::new(far)).await;
        });
        Ok(Box::new(near))
    }

    fn connectedness(&self, info: &PeerInfo) -> Connectedness {
        if info.id == self.self_info.id {
            Connectedness::Connected
        } else if self.registry.is_failed(&info.id) {
            Connectedness::NotConnected
        } else {
            Connectedness::CanConnect
        }
    }

    fn self_info(&self) -> PeerInfo {
        self.self_info.clone()
    }
}

pub fn peer_id(index: u32) -> PeerId {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&index.to_be_bytes());
    PeerId::from_bytes(bytes)
}

pub fn peer_info(index: u32) -> PeerInfo {
    PeerInfo::new(peer_id(index), vec![format!("/sim/node-{index}")])
}

/// Config for small simulated networks: fast timeouts, no background walk.
pub fn sim_config(k: usize, alpha: usize) -> Config {
    Config {
        k,
        alpha,
        closer_peer_count: k,
        response_timeout: Duration::from_millis(500),
        max_lookup_queries: Some(256),
        lookup_deadline: Some(Duration::from_secs(30)),
        random_walk: RandomWalkConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Opt-in log output: `RUST_LOG=rhizome=trace cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn spawn_node(registry: &Arc<NetworkRegistry>, index: u32, config: Config) -> Dht<SimHost> {
    init_tracing();
    let host = SimHost::new(registry.clone(), peer_info(index));
    let node = Dht::spawn(host, config);
    registry.register(&node);
    node
}

pub fn spawn_node_with_validator(
    registry: &Arc<NetworkRegistry>,
    index: u32,
    config: Config,
    validator: Arc<dyn rhizome::Validator>,
) -> Dht<SimHost> {
    let host = SimHost::new(registry.clone(), peer_info(index));
    let node = Dht::builder(host).config(config).validator(validator).spawn();
    registry.register(&node);
    node
}

/// Validator that refuses every record.
pub struct RejectAll;

impl rhizome::Validator for RejectAll {
    fn validate(&self, _key: &[u8], _value: &[u8]) -> Result<(), DhtError> {
        Err(DhtError::ValidationRejected)
    }

    fn select(&self, _key: &[u8], _values: &[&[u8]]) -> usize {
        0
    }
}

/// A line of nodes where node `i` knows only nodes `i-1` and `i+1`.
pub async fn spawn_chain(
    registry: &Arc<NetworkRegistry>,
    count: u32,
    config: Config,
) -> Vec<Dht<SimHost>> {
    let nodes: Vec<_> = (0..count)
        .map(|i| spawn_node(registry, i, config.clone()))
        .collect();

    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            node.add_peer(&peer_info(i as u32 - 1), false, false).await;
        }
        if i + 1 < nodes.len() {
            node.add_peer(&peer_info(i as u32 + 1), false, false).await;
        }
    }
    nodes
}

/// A fully meshed network: every node knows every other node.
pub async fn spawn_mesh(
    registry: &Arc<NetworkRegistry>,
    count: u32,
    config: Config,
) -> Vec<Dht<SimHost>> {
    let nodes: Vec<_> = (0..count)
        .map(|i| spawn_node(registry, i, config.clone()))
        .collect();

    for (i, node) in nodes.iter().enumerate() {
        for j in 0..count {
            if j != i as u32 {
                node.add_peer(&peer_info(j), false, false).await;
            }
        }
    }
    nodes
}

pub async fn shutdown_all(nodes: &[Dht<SimHost>]) {
    for node in nodes {
        node.shutdown().await;
    }
}
