//! Iterative parallel lookup engine.
//!
//! Every query walks the keyspace the same way: seed the candidate set from
//! the local routing table, keep up to α requests in flight against the
//! closest unqueried candidates, fold `closer_peers` from each reply back
//! into the candidate set, and stop once the k closest known candidates
//! have all been queried (or a deadline, query budget, or the visitor ends
//! the walk early).
//!
//! Failures are local to one candidate: the peer is marked failed, softly
//! demoted in the routing table, and the walk moves on. Dropping the
//! returned future aborts all in-flight requests, which resets their
//! streams.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::DhtError;
use crate::host::Host;
use crate::identity::{Distance, NodeId, PeerId, PeerInfo};
use crate::messages::{Connectedness, Message};
use crate::node::{hex_prefix, Dht, ADDRESS_TTL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CandidateState {
    Unqueried,
    InFlight,
    Succeeded,
    Failed,
}

struct Candidate {
    info: PeerInfo,
    distance: Distance,
    state: CandidateState,
}

/// What a finished lookup hands back to its executor.
pub(crate) struct LookupOutcome {
    /// The k succeeded peers closest to the target, ascending by distance.
    pub closest: Vec<PeerInfo>,
    /// Every peer that answered, in completion order.
    pub responded: Vec<PeerId>,
}

/// One in-flight iterative lookup toward a target id.
pub(crate) struct LookupEngine<H: Host> {
    node: Dht<H>,
    target: NodeId,
    request: Message,
    candidates: Vec<Candidate>,
    best: Distance,
    k: usize,
    alpha: usize,
    candidate_cap: usize,
    request_timeout: Duration,
    deadline: Option<Duration>,
    max_queries: Option<usize>,
}

impl<H: Host> LookupEngine<H> {
    pub fn new(node: Dht<H>, target: NodeId, request: Message) -> Self {
        let config = node.config();
        Self {
            k: config.k,
            alpha: config.alpha,
            candidate_cap: config.candidate_cap(),
            request_timeout: config.response_timeout,
            deadline: config.lookup_deadline,
            max_queries: config.max_lookup_queries,
            node,
            target,
            request,
            candidates: Vec::new(),
            best: Distance::MAX,
        }
    }

    /// Drive the lookup to a terminal state.
    ///
    /// `visit` sees every successful reply and may return `false` to end
    /// the walk early (e.g. once enough providers were gathered).
    pub async fn run<F>(mut self, mut visit: F) -> Result<LookupOutcome, DhtError>
    where
        F: FnMut(&PeerId, &Message) -> bool,
    {
        let seeds = self.node.nearest_peer_infos(&self.target, self.k).await?;
        if seeds.len() < self.alpha {
            return Err(DhtError::NoSeeds);
        }
        for info in seeds {
            self.merge_candidate(info);
        }

        let started = Instant::now();
        let mut in_flight: JoinSet<(PeerId, Result<Message, DhtError>)> = JoinSet::new();
        let mut queries_started = 0usize;
        let mut responded: Vec<PeerId> = Vec::new();

        loop {
            if self.deadline.is_some_and(|d| started.elapsed() >= d) {
                debug!(
                    target = %hex_prefix(self.target.as_bytes()),
                    queried = queries_started,
                    "lookup deadline reached, returning current results"
                );
                break;
            }

            while in_flight.len() < self.alpha {
                if self.max_queries.is_some_and(|max| queries_started >= max) {
                    break;
                }
                let Some(idx) = self.next_unqueried() else { break };
                self.candidates[idx].state = CandidateState::InFlight;
                queries_started += 1;

                let node = self.node.clone();
                let peer = self.candidates[idx].info.id;
                let request = self.request.clone();
                let timeout = self.request_timeout;
                in_flight.spawn(async move {
                    let result = node.query_peer(&peer, &request, timeout).await;
                    (peer, result)
                });
            }

            // Nothing running and nothing left to pick: terminal.
            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let Ok((peer, result)) = joined else { continue };

            match result {
                Ok(reply) => {
                    self.set_state(&peer, CandidateState::Succeeded);
                    responded.push(peer);
                    self.node.record_reply(peer).await;
                    self.absorb_closer_peers(&reply);
                    if !visit(&peer, &reply) {
                        trace!(
                            target = %hex_prefix(self.target.as_bytes()),
                            "lookup completed early by visitor"
                        );
                        break;
                    }
                }
                Err(err) => {
                    trace!(peer = %peer, error = %err, "lookup candidate failed");
                    self.set_state(&peer, CandidateState::Failed);
                    self.node.demote_peer(peer).await;
                }
            }
        }

        debug!(
            target = %hex_prefix(self.target.as_bytes()),
            queried = queries_started,
            responded = responded.len(),
            "lookup completed"
        );

        let closest = self
            .candidates
            .iter()
            .filter(|c| c.state == CandidateState::Succeeded)
            .take(self.k)
            .map(|c| c.info.clone())
            .collect();
        Ok(LookupOutcome { closest, responded })
    }

    /// The closest unqueried candidate within the top k, if any.
    fn next_unqueried(&self) -> Option<usize> {
        self.candidates
            .iter()
            .take(self.k)
            .position(|c| c.state == CandidateState::Unqueried)
    }

    fn set_state(&mut self, peer: &PeerId, state: CandidateState) {
        if let Some(candidate) = self.candidates.iter_mut().find(|c| &c.info.id == peer) {
            candidate.state = state;
        }
    }

    /// Fold a reply's `closer_peers` into the candidate set and the address
    /// book. Peers without usable addresses are dropped.
    fn absorb_closer_peers(&mut self, reply: &Message) {
        for peer in &reply.closer_peers {
            if peer.connectedness == Connectedness::CannotConnect {
                continue;
            }
            if peer.info.addrs.is_empty() {
                continue;
            }
            if peer.info.id == self.node.self_peer() {
                continue;
            }
            self.node
                .address_book()
                .upsert(&peer.info.id, &peer.info.addrs, Some(ADDRESS_TTL));
            self.merge_candidate(peer.info.clone());
        }
    }

    fn merge_candidate(&mut self, info: PeerInfo) {
        if self.candidates.iter().any(|c| c.info.id == info.id) {
            return;
        }
        let distance = NodeId::from_peer(&info.id).distance(&self.target);
        // Equal distances keep insertion order.
        let pos = self.candidates.partition_point(|c| c.distance <= distance);
        self.candidates.insert(
            pos,
            Candidate {
                info,
                distance,
                state: CandidateState::Unqueried,
            },
        );
        if self.candidates.len() > self.candidate_cap {
            self.candidates.truncate(self.candidate_cap);
        }
        if distance < self.best {
            self.best = distance;
            trace!(
                target = %hex_prefix(self.target.as_bytes()),
                "lookup found closer candidate"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    use crate::config::Config;
    use crate::host::DhtStream;
    use crate::messages::MessagePeer;

    fn peer(seed: u32) -> PeerId {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&seed.to_be_bytes());
        PeerId::from_bytes(bytes)
    }

    fn info(seed: u32) -> PeerInfo {
        PeerInfo::new(peer(seed), vec![format!("/sim/{seed}")])
    }

    /// Host whose peers answer FindNode with a canned closer-peer list.
    struct ScriptedHost {
        self_info: PeerInfo,
        replies: Mutex<HashMap<PeerId, Vec<PeerInfo>>>,
        silent: Mutex<Vec<PeerId>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl ScriptedHost {
        fn new(self_seed: u32) -> Self {
            Self {
                self_info: info(self_seed),
                replies: Mutex::new(HashMap::new()),
                silent: Mutex::new(Vec::new()),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn script(&self, target: u32, closer: &[u32]) {
            self.replies
                .lock()
                .unwrap()
                .insert(peer(target), closer.iter().map(|&s| info(s)).collect());
        }

        fn silence(&self, target: u32) {
            self.silent.lock().unwrap().push(peer(target));
        }
    }

    #[async_trait]
    impl Host for ScriptedHost {
        async fn open_stream(
            &self,
            peer_id: &PeerId,
            _protocols: &[String],
        ) -> Result<DhtStream, DhtError> {
            let (local, mut remote) = tokio::io::duplex(64 * 1024);

            if self.silent.lock().unwrap().contains(peer_id) {
                tokio::spawn(async move {
                    // Swallow the request, never answer.
                    let mut sink = Vec::new();
                    let _ = remote.read_to_end(&mut sink).await;
                });
                return Ok(Box::new(local));
            }

            let closer = self
                .replies
                .lock()
                .unwrap()
                .get(peer_id)
                .cloned()
                .unwrap_or_default();
            let in_flight = self.in_flight.clone();
            let max_in_flight = self.max_in_flight.clone();

            tokio::spawn(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                // Let concurrent requests overlap before replying.
                tokio::time::sleep(Duration::from_millis(20)).await;

                let limit = 64 * 1024;
                if let Ok(Some(mut msg)) = crate::messages::read_message(&mut remote, limit).await {
                    msg.closer_peers = closer
                        .into_iter()
                        .map(|info| MessagePeer {
                            info,
                            connectedness: Connectedness::CanConnect,
                        })
                        .collect();
                    // Release the gauge before the reply can unblock the
                    // next request, so it never over-reads concurrency.
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = crate::messages::write_message(&mut remote, &msg, limit).await;
                } else {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                // Hold the stream open until the requester hangs up.
                let mut sink = Vec::new();
                let _ = remote.read_to_end(&mut sink).await;
            });
            Ok(Box::new(local))
        }

        fn connectedness(&self, _info: &PeerInfo) -> Connectedness {
            Connectedness::CanConnect
        }

        fn self_info(&self) -> PeerInfo {
            self.self_info.clone()
        }
    }

    fn test_config(alpha: usize) -> Config {
        Config {
            alpha,
            response_timeout: Duration::from_millis(300),
            random_walk: crate::config::RandomWalkConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn seed(node: &Dht<ScriptedHost>, seeds: &[u32]) {
        for &s in seeds {
            node.add_peer(&info(s), false, false).await;
        }
    }

    fn engine(node: &Dht<ScriptedHost>, target: u32) -> LookupEngine<ScriptedHost> {
        LookupEngine::new(
            node.clone(),
            NodeId::from_peer(&peer(target)),
            Message::find_node(peer(target).as_bytes().to_vec()),
        )
    }

    #[tokio::test]
    async fn lookup_walks_toward_the_target() {
        let host = ScriptedHost::new(0);
        host.script(1, &[2, 3]);
        host.script(2, &[4]);
        host.script(3, &[4]);
        host.script(4, &[99]);
        host.script(99, &[]);

        let node = Dht::spawn(host, test_config(2));
        seed(&node, &[1, 2]).await;

        let outcome = engine(&node, 99).run(|_, _| true).await.unwrap();
        assert!(outcome.closest.iter().any(|i| i.id == peer(99)));
        assert_eq!(outcome.closest[0].id, peer(99), "target must sort first");
        node.shutdown().await;
    }

    #[tokio::test]
    async fn lookup_without_enough_seeds_fails() {
        let host = ScriptedHost::new(0);
        let node = Dht::spawn(host, test_config(2));
        seed(&node, &[1]).await;

        let result = engine(&node, 99).run(|_, _| true).await;
        assert!(matches!(result, Err(DhtError::NoSeeds)));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn all_candidates_timing_out_completes_empty() {
        let host = ScriptedHost::new(0);
        host.silence(1);
        host.silence(2);

        let node = Dht::spawn(host, test_config(2));
        seed(&node, &[1, 2]).await;

        let outcome = engine(&node, 99).run(|_, _| true).await.unwrap();
        assert!(outcome.closest.is_empty());
        assert!(outcome.responded.is_empty());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_alpha() {
        let host = ScriptedHost::new(0);
        for s in 1..=12u32 {
            host.script(s, &[s + 1]);
        }
        host.script(13, &[]);
        let gauge = host.max_in_flight.clone();

        let node = Dht::spawn(host, test_config(3));
        seed(&node, &(1..=8u32).collect::<Vec<_>>()).await;

        let _ = engine(&node, 13).run(|_, _| true).await.unwrap();
        assert!(
            gauge.load(Ordering::SeqCst) <= 3,
            "alpha gate violated: {} in flight",
            gauge.load(Ordering::SeqCst)
        );
        node.shutdown().await;
    }

    #[tokio::test]
    async fn candidate_set_stays_capped() {
        let host = ScriptedHost::new(0);
        // Every reply floods the candidate set with fresh peers.
        let flood: Vec<u32> = (100..220).collect();
        for s in 1..=6u32 {
            host.script(s, &flood);
        }
        for &s in &flood {
            host.script(s, &[]);
        }

        let mut config = test_config(3);
        config.k = 4;
        config.max_lookup_queries = Some(16);
        let node = Dht::spawn(host, config);
        seed(&node, &[1, 2, 3, 4]).await;

        let mut this = engine(&node, 250);
        this.k = 4;
        this.candidate_cap = 12;
        let outcome = this.run(|_, _| true).await.unwrap();
        assert!(outcome.closest.len() <= 4);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn visitor_false_stops_the_walk() {
        let host = ScriptedHost::new(0);
        for s in 1..=8u32 {
            host.script(s, &[s + 10]);
            host.script(s + 10, &[]);
        }

        let node = Dht::spawn(host, test_config(2));
        seed(&node, &[1, 2, 3, 4]).await;

        let mut replies = 0;
        let outcome = engine(&node, 50)
            .run(|_, _| {
                replies += 1;
                false
            })
            .await
            .unwrap();
        assert_eq!(replies, 1);
        assert_eq!(outcome.responded.len(), 1);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn failed_candidates_do_not_abort_the_walk() {
        let host = ScriptedHost::new(0);
        host.silence(1);
        host.script(2, &[5]);
        host.script(5, &[]);

        let node = Dht::spawn(host, test_config(2));
        seed(&node, &[1, 2]).await;

        let outcome = engine(&node, 5).run(|_, _| true).await.unwrap();
        assert!(outcome.closest.iter().any(|i| i.id == peer(5)));
        assert!(!outcome.responded.contains(&peer(1)));
        node.shutdown().await;
    }
}
