//! The DHT node: public handle, state-owning actor, inbound dispatcher, and
//! maintenance loops.
//!
//! ## Actor architecture
//!
//! - [`Dht`]: public handle, cheap to clone, shared by queries and the
//!   embedder
//! - `DhtActor`: owns the routing table, provider index, and value store;
//!   processes commands sequentially, so no state needs locking
//!
//! Queries and maintenance tasks hold handle clones and post commands over
//! an async channel; all table mutations are serialized by the actor task.
//!
//! ## Inbound flow
//!
//! The embedder routes streams negotiated for the configured protocol ids
//! to [`Dht::handle_inbound_stream`]. Each stream gets a session that reads
//! framed messages and dispatches them by type, replying on the same
//! stream. Streams from our own peer id are dropped without processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::DhtError;
use crate::host::{
    AcceptAllValidator, AddressBook, DhtStream, Host, MemoryAddressBook, OsRandom, RandomSource,
    Validator,
};
use crate::identity::{Key, NodeId, PeerId, PeerInfo};
use crate::messages::{Connectedness, Message, MessagePeer, MessageType, Record};
use crate::records::{ProviderRoutingTable, ValueStore};
use crate::routing::PeerRoutingTable;
use crate::session::Session;

/// TTL applied to addresses learned from lookups and replies.
pub(crate) const ADDRESS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Command channel depth; senders see backpressure when the actor lags.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Snapshot of table sizes for telemetry.
#[derive(Clone, Debug, Default)]
pub struct DhtStats {
    pub routing_peers: usize,
    pub provider_keys: usize,
    pub provider_entries: usize,
    pub stored_values: usize,
}

enum Command {
    UpdatePeer {
        peer: PeerId,
        is_permanent: bool,
        is_connected: bool,
        reply: Option<oneshot::Sender<Result<bool, DhtError>>>,
    },
    MarkDisconnected(PeerId),
    RemovePeer(PeerId),
    NearestPeers {
        target: NodeId,
        count: usize,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    AddProviderRecord {
        key: Key,
        peer: PeerId,
        ttl: Option<Duration>,
    },
    ProvidersOf {
        key: Key,
        limit: Option<usize>,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    PutLocal {
        key: Key,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<bool, DhtError>>,
    },
    GetLocal {
        key: Key,
        reply: oneshot::Sender<Option<(Vec<u8>, u64)>>,
    },
    Stats {
        reply: oneshot::Sender<DhtStats>,
    },
    Gc,
    Quit,
}

/// Handle to a running DHT node.
pub struct Dht<H: Host> {
    cmd_tx: mpsc::Sender<Command>,
    host: Arc<H>,
    address_book: Arc<dyn AddressBook>,
    validator: Arc<dyn Validator>,
    random: Arc<dyn RandomSource>,
    config: Arc<Config>,
    self_peer: PeerId,
}

impl<H: Host> Clone for Dht<H> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            host: self.host.clone(),
            address_book: self.address_book.clone(),
            validator: self.validator.clone(),
            random: self.random.clone(),
            config: self.config.clone(),
            self_peer: self.self_peer,
        }
    }
}

/// Builder for a [`Dht`] node with pluggable collaborators.
pub struct DhtBuilder<H: Host> {
    host: H,
    config: Config,
    address_book: Option<Arc<dyn AddressBook>>,
    validator: Option<Arc<dyn Validator>>,
    random: Option<Arc<dyn RandomSource>>,
}

impl<H: Host> DhtBuilder<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            config: Config::default(),
            address_book: None,
            validator: None,
            random: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn address_book(mut self, book: Arc<dyn AddressBook>) -> Self {
        self.address_book = Some(book);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Spawn the actor and maintenance tasks.
    ///
    /// # Panics
    /// Panics on an inconsistent [`Config`]; a bad configuration is a
    /// programming error, not a runtime condition.
    pub fn spawn(self) -> Dht<H> {
        if let Err(reason) = self.config.validate() {
            panic!("invalid DHT config: {reason}");
        }

        let host = Arc::new(self.host);
        let self_info = host.self_info();
        let address_book = self
            .address_book
            .unwrap_or_else(|| Arc::new(MemoryAddressBook::new()));
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(AcceptAllValidator));
        let random = self.random.unwrap_or_else(|| Arc::new(OsRandom));
        let config = Arc::new(self.config);

        // Seed ourselves into the address book, never into the table.
        if !self_info.addrs.is_empty() {
            address_book.upsert(&self_info.id, &self_info.addrs, None);
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let actor = DhtActor {
            routing: PeerRoutingTable::new(self_info.id, config.k),
            providers: ProviderRoutingTable::new(
                config.max_providers_per_key,
                config.max_provider_entries,
            ),
            store: ValueStore::new(config.max_record_age, config.max_value_size),
            validator: validator.clone(),
            address_book: address_book.clone(),
            cmd_rx,
        };
        tokio::spawn(actor.run());

        let node = Dht {
            cmd_tx,
            host,
            address_book,
            validator,
            random,
            config,
            self_peer: self_info.id,
        };

        if node.config.random_walk.enabled {
            node.spawn_random_walk();
        }
        node.spawn_gc();
        node
    }
}

impl<H: Host> Dht<H> {
    pub fn builder(host: H) -> DhtBuilder<H> {
        DhtBuilder::new(host)
    }

    /// Spawn a node with default collaborators (in-memory address book,
    /// accept-all validator, OS randomness).
    pub fn spawn(host: H, config: Config) -> Self {
        DhtBuilder::new(host).config(config).spawn()
    }

    pub fn self_peer(&self) -> PeerId {
        self.self_peer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn host(&self) -> &H {
        &self.host
    }

    pub(crate) fn address_book(&self) -> &Arc<dyn AddressBook> {
        &self.address_book
    }

    pub(crate) fn validator(&self) -> &Arc<dyn Validator> {
        &self.validator
    }

    pub(crate) fn random(&self) -> &Arc<dyn RandomSource> {
        &self.random
    }

    /// Stop the actor. Maintenance tasks notice the closed channel and end.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Quit).await;
    }

    // ========================================================================
    // Peer bookkeeping
    // ========================================================================

    /// Record a peer with known addresses: upsert the address book, then the
    /// routing table. Peers without addresses are skipped.
    pub async fn add_peer(&self, info: &PeerInfo, is_permanent: bool, is_connected: bool) {
        if info.addrs.is_empty() {
            debug!(peer = %info.id, "peer skipped: no known addresses");
            return;
        }
        let ttl = if is_permanent { None } else { Some(ADDRESS_TTL) };
        self.address_book.upsert(&info.id, &info.addrs, ttl);

        match self.update_peer(info.id, is_permanent, is_connected).await {
            Ok(true) => debug!(peer = %info.id, "peer added to routing table"),
            Ok(false) => trace!(peer = %info.id, "peer refreshed in routing table"),
            Err(e) => debug!(peer = %info.id, error = %e, "peer not added to routing table"),
        }
    }

    /// Hook for the host's outbound connection events.
    pub async fn on_peer_connected(&self, info: &PeerInfo) {
        self.add_peer(info, false, true).await;
    }

    /// Hook for the host's disconnect events. Clears the liveness flag
    /// without evicting.
    pub async fn on_peer_disconnected(&self, peer: PeerId) {
        let _ = self.cmd_tx.send(Command::MarkDisconnected(peer)).await;
    }

    /// Drop a peer from the routing table.
    pub async fn remove_peer(&self, peer: PeerId) {
        let _ = self.cmd_tx.send(Command::RemovePeer(peer)).await;
    }

    /// Table sizes for telemetry.
    pub async fn stats(&self) -> DhtStats {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Stats { reply: tx })
            .await
            .is_err()
        {
            return DhtStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub(crate) async fn update_peer(
        &self,
        peer: PeerId,
        is_permanent: bool,
        is_connected: bool,
    ) -> Result<bool, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::UpdatePeer {
                peer,
                is_permanent,
                is_connected,
                reply: Some(tx),
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        rx.await.map_err(|_| DhtError::ActorClosed)?
    }

    /// Liveness credit for a peer that answered a request.
    pub(crate) async fn record_reply(&self, peer: PeerId) {
        let _ = self
            .cmd_tx
            .send(Command::UpdatePeer {
                peer,
                is_permanent: false,
                is_connected: true,
                reply: None,
            })
            .await;
    }

    /// Soft demotion for a peer that failed to answer: it loses its
    /// connected flag and becomes evictable, but is not removed.
    pub(crate) async fn demote_peer(&self, peer: PeerId) {
        let _ = self
            .cmd_tx
            .send(Command::UpdatePeer {
                peer,
                is_permanent: false,
                is_connected: false,
                reply: None,
            })
            .await;
    }

    /// Up to `count` peers nearest to `target` that have dialable
    /// addresses.
    pub(crate) async fn nearest_peer_infos(
        &self,
        target: &NodeId,
        count: usize,
    ) -> Result<Vec<PeerInfo>, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::NearestPeers {
                target: *target,
                count,
                reply: tx,
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        let ids = rx.await.map_err(|_| DhtError::ActorClosed)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let addrs = self.address_book.addresses_of(&id);
                (!addrs.is_empty()).then(|| PeerInfo::new(id, addrs))
            })
            .collect())
    }

    pub(crate) async fn add_provider_record(
        &self,
        key: Key,
        peer: PeerId,
        ttl: Option<Duration>,
    ) -> Result<(), DhtError> {
        self.cmd_tx
            .send(Command::AddProviderRecord { key, peer, ttl })
            .await
            .map_err(|_| DhtError::ActorClosed)
    }

    pub(crate) async fn providers_of(
        &self,
        key: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<PeerId>, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ProvidersOf {
                key: key.to_vec(),
                limit,
                reply: tx,
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        rx.await.map_err(|_| DhtError::ActorClosed)
    }

    pub(crate) async fn put_local(&self, key: Key, value: Vec<u8>) -> Result<bool, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PutLocal {
                key,
                value,
                reply: tx,
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        rx.await.map_err(|_| DhtError::ActorClosed)?
    }

    pub(crate) async fn get_local(&self, key: &[u8]) -> Result<Option<(Vec<u8>, u64)>, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetLocal {
                key: key.to_vec(),
                reply: tx,
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        rx.await.map_err(|_| DhtError::ActorClosed)
    }

    // ========================================================================
    // Outbound requests
    // ========================================================================

    /// One request/response exchange on a fresh stream.
    pub(crate) async fn query_peer(
        &self,
        peer: &PeerId,
        request: &Message,
        deadline: Duration,
    ) -> Result<Message, DhtError> {
        if *peer == self.self_peer {
            return Err(DhtError::SelfDial);
        }
        let stream = self.host.open_stream(peer, &self.config.protocols).await?;
        let mut session = Session::new(stream, self.config.max_value_size);
        session.request(request, deadline).await
    }

    /// Fire one message on a fresh stream without waiting for a reply.
    pub(crate) async fn send_one(&self, peer: &PeerId, msg: &Message) -> Result<(), DhtError> {
        if *peer == self.self_peer {
            return Err(DhtError::SelfDial);
        }
        let stream = self.host.open_stream(peer, &self.config.protocols).await?;
        let mut session = Session::new(stream, self.config.max_value_size);
        session.write(msg).await
    }

    // ========================================================================
    // Inbound dispatch
    // ========================================================================

    /// Serve one inbound protocol stream until EOF, idle timeout, or error.
    ///
    /// `remote` is the stream's authenticated remote peer id as reported by
    /// the transport. Streams from our own id are dropped unprocessed.
    pub async fn handle_inbound_stream(&self, remote: PeerId, stream: DhtStream) {
        if remote == self.self_peer {
            debug!("refusing inbound stream from ourselves");
            return;
        }
        trace!(peer = %remote, "inbound stream");

        let mut session = Session::new(stream, self.config.max_value_size);
        loop {
            let msg = match session.read_timeout(self.config.response_timeout).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(DhtError::Timeout) => {
                    trace!(peer = %remote, "inbound session idle, closing");
                    break;
                }
                Err(e) => {
                    debug!(peer = %remote, error = %e, "inbound session ended");
                    break;
                }
            };

            if let Err(e) = self.dispatch_inbound(&remote, msg, &mut session).await {
                if e == DhtError::ActorClosed {
                    break;
                }
                debug!(peer = %remote, error = %e, "inbound message failed");
                break;
            }
        }
    }

    async fn dispatch_inbound(
        &self,
        remote: &PeerId,
        msg: Message,
        session: &mut Session,
    ) -> Result<(), DhtError> {
        match msg.message_type {
            MessageType::PutValue => self.on_put_value(remote, msg, session).await,
            MessageType::GetValue => self.on_get_value(remote, msg, session).await,
            MessageType::AddProvider => self.on_add_provider(remote, msg).await,
            MessageType::GetProviders => self.on_get_providers(remote, msg, session).await,
            MessageType::FindNode => self.on_find_node(remote, msg, session).await,
            MessageType::Ping => session.write(&Message::ping()).await,
        }
    }

    /// Validate and store, then echo the message as the wire-level ack.
    /// Rejected records are logged and dropped without an echo.
    async fn on_put_value(
        &self,
        remote: &PeerId,
        msg: Message,
        session: &mut Session,
    ) -> Result<(), DhtError> {
        let Some(record) = msg.record.as_ref() else {
            warn!(peer = %remote, "incoming PutValue without record");
            return Ok(());
        };

        match self
            .put_local(record.key.clone(), record.value.clone())
            .await
        {
            Ok(_) => session.write(&msg).await,
            Err(DhtError::ValidationRejected) => {
                warn!(
                    peer = %remote,
                    key = %hex_prefix(&record.key),
                    "incoming PutValue rejected by validator"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Reply with the local record (if any), local providers of the key,
    /// and the nearest peers to it so the caller's walk can progress.
    async fn on_get_value(
        &self,
        remote: &PeerId,
        mut msg: Message,
        session: &mut Session,
    ) -> Result<(), DhtError> {
        if msg.key.is_empty() {
            warn!(peer = %remote, "incoming GetValue with empty key");
            return Ok(());
        }
        let want = self.config.closer_peer_count;

        let providers = self.providers_of(&msg.key, None).await?;
        msg.provider_peers = self.peer_entries(&providers, want);

        let target = NodeId::from_key(&msg.key);
        let nearest = self.nearest_ids(&target, want * 2).await?;
        msg.closer_peers = self.peer_entries(&nearest, want);

        if let Some((value, received_at)) = self.get_local(&msg.key).await? {
            msg.record = Some(Record::new(msg.key.clone(), value, received_at));
        }

        session.write(&msg).await
    }

    /// Accept provider records only for the authenticated remote peer
    /// itself; third-party announcements are ignored.
    async fn on_add_provider(&self, remote: &PeerId, msg: Message) -> Result<(), DhtError> {
        if msg.provider_peers.is_empty() {
            warn!(peer = %remote, "incoming AddProvider without providers");
            return Ok(());
        }

        for provider in &msg.provider_peers {
            if provider.info.id != *remote {
                debug!(
                    peer = %remote,
                    claimed = %provider.info.id,
                    "ignoring third-party provider announcement"
                );
                continue;
            }
            self.add_provider_record(
                msg.key.clone(),
                provider.info.id,
                Some(self.config.max_provider_age),
            )
            .await?;
            self.add_peer(&provider.info, false, false).await;
        }
        Ok(())
    }

    /// Reply with known providers of the key and the nearest peers to it.
    async fn on_get_providers(
        &self,
        remote: &PeerId,
        mut msg: Message,
        session: &mut Session,
    ) -> Result<(), DhtError> {
        if msg.key.is_empty() {
            warn!(peer = %remote, "incoming GetProviders with empty key");
            return Ok(());
        }
        let want = self.config.closer_peer_count;

        let providers = self.providers_of(&msg.key, Some(want * 2)).await?;
        msg.provider_peers = self.peer_entries(&providers, want);

        let target = NodeId::from_key(&msg.key);
        let nearest = self.nearest_ids(&target, want * 2).await?;
        msg.closer_peers = self.peer_entries(&nearest, want);

        session.write(&msg).await
    }

    /// Reply with the nearest peers to the key. Addresses the sender
    /// attached are merged into the address book first.
    async fn on_find_node(
        &self,
        remote: &PeerId,
        mut msg: Message,
        session: &mut Session,
    ) -> Result<(), DhtError> {
        if msg.key.is_empty() {
            warn!(peer = %remote, "incoming FindNode with empty key");
            return Ok(());
        }

        for peer in msg.closer_peers.drain(..) {
            if peer.connectedness == Connectedness::CannotConnect || peer.info.addrs.is_empty() {
                continue;
            }
            self.address_book
                .upsert(&peer.info.id, &peer.info.addrs, Some(ADDRESS_TTL));
        }

        let target = NodeId::from_key(&msg.key);
        let nearest = self
            .nearest_ids(&target, self.config.closer_peer_count * 2)
            .await?;
        msg.closer_peers = self.peer_entries(&nearest, self.config.closer_peer_count);

        session.write(&msg).await
    }

    async fn nearest_ids(&self, target: &NodeId, count: usize) -> Result<Vec<PeerId>, DhtError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::NearestPeers {
                target: *target,
                count,
                reply: tx,
            })
            .await
            .map_err(|_| DhtError::ActorClosed)?;
        rx.await.map_err(|_| DhtError::ActorClosed)
    }

    /// Enrich peer ids into reply entries: address-book addresses plus the
    /// host's connectedness verdict, dropping unreachable or addressless
    /// peers.
    pub(crate) fn peer_entries(&self, peers: &[PeerId], limit: usize) -> Vec<MessagePeer> {
        let mut entries = Vec::with_capacity(limit.min(peers.len()));
        for peer in peers {
            if entries.len() >= limit {
                break;
            }
            let addrs = self.address_book.addresses_of(peer);
            if addrs.is_empty() {
                continue;
            }
            let info = PeerInfo::new(*peer, addrs);
            let connectedness = self.host.connectedness(&info);
            if connectedness == Connectedness::CannotConnect {
                continue;
            }
            entries.push(MessagePeer {
                info,
                connectedness,
            });
        }
        entries
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Random-walk discovery: FindPeer on a synthetic random id, repeated on
    /// the configured cadence. One task, one outstanding timer.
    fn spawn_random_walk(&self) {
        let node = self.clone();
        tokio::spawn(async move {
            let walk = node.config.random_walk.clone();
            let mut iteration: usize = 0;
            loop {
                if let Err(e) = node.find_random_peer().await {
                    debug!(error = %e, "random walk lookup failed");
                }

                let period_spent = walk.delay * walk.queries_per_period as u32;
                let spacing = if iteration % walk.queries_per_period == 0 {
                    walk.interval.saturating_sub(period_spent)
                } else {
                    walk.delay
                };
                iteration = iteration.wrapping_add(1);

                tokio::time::sleep(spacing).await;
                if node.cmd_tx.is_closed() {
                    break;
                }
            }
        });
    }

    /// Periodic expiry sweep over providers, values, and the address book.
    fn spawn_gc(&self) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(node.config.gc_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                node.address_book.remove_expired();
                if node.cmd_tx.send(Command::Gc).await.is_err() {
                    break;
                }
            }
        });
    }
}

pub(crate) fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}

// ============================================================================
// Actor (owns all mutable state)
// ============================================================================

struct DhtActor {
    routing: PeerRoutingTable,
    providers: ProviderRoutingTable,
    store: ValueStore,
    validator: Arc<dyn Validator>,
    address_book: Arc<dyn AddressBook>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl DhtActor {
    async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::UpdatePeer {
                    peer,
                    is_permanent,
                    is_connected,
                    reply,
                } => {
                    let result = self.handle_update(peer, is_permanent, is_connected);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::MarkDisconnected(peer) => {
                    self.routing.set_connected(&peer, false);
                }
                Command::RemovePeer(peer) => {
                    self.routing.remove(&peer);
                }
                Command::NearestPeers {
                    target,
                    count,
                    reply,
                } => {
                    let _ = reply.send(self.routing.nearest(&target, count));
                }
                Command::AddProviderRecord { key, peer, ttl } => {
                    self.providers.add(key, peer, ttl);
                }
                Command::ProvidersOf { key, limit, reply } => {
                    let _ = reply.send(self.providers.providers_of(&key, limit));
                }
                Command::PutLocal { key, value, reply } => {
                    let result = self.store.put(
                        self.validator.as_ref(),
                        key,
                        value,
                        crate::messages::unix_now_secs(),
                    );
                    let _ = reply.send(result);
                }
                Command::GetLocal { key, reply } => {
                    let _ = reply.send(self.store.get(&key));
                }
                Command::Stats { reply } => {
                    let _ = reply.send(DhtStats {
                        routing_peers: self.routing.size(),
                        provider_keys: self.providers.key_count(),
                        provider_entries: self.providers.entry_count(),
                        stored_values: self.store.len(),
                    });
                }
                Command::Gc => {
                    self.providers.gc();
                    self.store.gc();
                }
                Command::Quit => {
                    debug!("DHT actor shutting down");
                    break;
                }
            }
        }
    }

    /// Routing-table update with the address-book precondition: a peer
    /// enters the table only while the book can dial it.
    fn handle_update(
        &mut self,
        peer: PeerId,
        is_permanent: bool,
        is_connected: bool,
    ) -> Result<bool, DhtError> {
        if !self.routing.contains(&peer) && self.address_book.addresses_of(&peer).is_empty() {
            trace!(peer = %peer, "peer not inserted: no addresses in book");
            return Ok(false);
        }
        self.routing.update(peer, is_permanent, is_connected)
    }
}
