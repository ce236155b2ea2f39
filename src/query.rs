//! Query executors: the public lookup operations built on the engine.
//!
//! Each executor pairs a lookup target with a request template and a
//! visitor that harvests the payload it cares about from successful
//! replies; completion logic lives here, traversal logic in
//! [`LookupEngine`](crate::lookup::LookupEngine).

use std::collections::HashSet;

use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::error::DhtError;
use crate::host::Host;
use crate::identity::{Key, NodeId, PeerId, PeerInfo};
use crate::lookup::LookupEngine;
use crate::messages::{unix_now_secs, Connectedness, Message, MessagePeer, Record};
use crate::node::{hex_prefix, Dht, ADDRESS_TTL};

impl<H: Host> Dht<H> {
    /// Locate a peer's addresses.
    ///
    /// Served from the address book when possible; otherwise an iterative
    /// FindNode walk toward the peer's node id. The walk resolves as soon
    /// as any reply names the target with usable addresses, or when the
    /// target itself answers a query.
    pub async fn find_peer(&self, peer: PeerId) -> Result<PeerInfo, DhtError> {
        debug!(peer = %peer, "CALL: FindPeer");

        let known = self.address_book().addresses_of(&peer);
        if !known.is_empty() {
            trace!(peer = %peer, "found locally");
            return Ok(PeerInfo::new(peer, known));
        }

        let target = NodeId::from_peer(&peer);
        let request = Message::find_node(peer.as_bytes().to_vec());
        let mut found: Option<PeerInfo> = None;

        let outcome = LookupEngine::new(self.clone(), target, request)
            .run(|_, reply| {
                for entry in &reply.closer_peers {
                    if entry.info.id == peer && !entry.info.addrs.is_empty() {
                        found = Some(entry.info.clone());
                        return false;
                    }
                }
                true
            })
            .await?;

        if let Some(info) = found {
            self.address_book()
                .upsert(&info.id, &info.addrs, Some(ADDRESS_TTL));
            return Ok(info);
        }

        // The target itself may have been among the replying peers.
        if outcome.responded.contains(&peer) {
            let addrs = self.address_book().addresses_of(&peer);
            if !addrs.is_empty() {
                return Ok(PeerInfo::new(peer, addrs));
            }
        }
        Err(DhtError::NotFound)
    }

    /// Fetch the best value stored under `key`.
    ///
    /// Served from the local store when fresh. Otherwise a GetValue walk
    /// collects candidate records, the validator selects among them, and
    /// the winner is pushed back to the nearest answered peers that
    /// returned a worse or missing record.
    pub async fn get_value(&self, key: &[u8]) -> Result<Vec<u8>, DhtError> {
        debug!(key = %hex_prefix(key), "CALL: GetValue");

        if let Some((value, _)) = self.get_local(key).await? {
            trace!(key = %hex_prefix(key), "found locally");
            return Ok(value);
        }

        let target = NodeId::from_key(key);
        let request = Message::get_value(key.to_vec());
        let mut records: Vec<(PeerId, Vec<u8>)> = Vec::new();

        let outcome = LookupEngine::new(self.clone(), target, request)
            .run(|from, reply| {
                if let Some(record) = &reply.record {
                    if record.key == key
                        && self.validator().validate(key, &record.value).is_ok()
                    {
                        records.push((*from, record.value.clone()));
                    }
                }
                true
            })
            .await?;

        if records.is_empty() {
            return Err(DhtError::NotFound);
        }

        let values: Vec<&[u8]> = records.iter().map(|(_, v)| v.as_slice()).collect();
        let best = records[self.validator().select(key, &values)].1.clone();

        // Fix-up: repair the nearest peers that answered with a worse or
        // absent record.
        let mut stale: Vec<PeerId> = outcome
            .responded
            .iter()
            .copied()
            .filter(|p| !records.iter().any(|(rp, v)| rp == p && *v == best))
            .collect();
        stale.sort_by_key(|p| NodeId::from_peer(p).distance(&target));
        stale.truncate(self.config().quorum);
        if !stale.is_empty() {
            trace!(key = %hex_prefix(key), peers = stale.len(), "record fix-up");
            let record = Record::new(key.to_vec(), best.clone(), unix_now_secs());
            let _ = self.fan_out_acked(stale, Message::put_value(record)).await;
        }

        Ok(best)
    }

    /// Store a value locally and replicate it to the k peers nearest the
    /// key. Best-effort: succeeds once at least one replica acknowledges.
    pub async fn put_value(&self, key: Key, value: Vec<u8>) -> Result<(), DhtError> {
        debug!(key = %hex_prefix(&key), "CALL: PutValue");

        self.put_local(key.clone(), value.clone()).await?;

        let target = NodeId::from_key(&key);
        let request = Message::find_node(key.clone());
        let outcome = LookupEngine::new(self.clone(), target, request)
            .run(|_, _| true)
            .await?;

        let addressees: Vec<PeerId> = outcome
            .closest
            .iter()
            .map(|info| info.id)
            .take(self.config().k)
            .collect();
        let record = Record::new(key.clone(), value, unix_now_secs());
        let acks = self
            .fan_out_acked(addressees, Message::put_value(record))
            .await;

        if acks > 0 {
            debug!(key = %hex_prefix(&key), acks, "PutValue replicated");
            Ok(())
        } else {
            Err(DhtError::Timeout)
        }
    }

    /// Find peers that can serve `key`, up to `limit` (0 = unlimited).
    ///
    /// Local provider records are served first; only when the post-filter
    /// local set already reaches `limit` is the network walk skipped.
    pub async fn find_providers(&self, key: &[u8], limit: usize) -> Result<Vec<PeerInfo>, DhtError> {
        debug!(key = %hex_prefix(key), limit, "CALL: FindProviders");
        let wanted = if limit == 0 { usize::MAX } else { limit };

        let mut seen: HashSet<PeerId> = HashSet::new();
        let mut collected: Vec<PeerInfo> = Vec::new();

        let local = self.providers_of(key, None).await?;
        for entry in self.peer_entries(&local, wanted) {
            if seen.insert(entry.info.id) {
                collected.push(entry.info);
            }
        }
        if collected.len() >= wanted {
            debug!(key = %hex_prefix(key), found = collected.len(), "providers found locally");
            collected.truncate(wanted);
            return Ok(collected);
        }

        let target = NodeId::from_key(key);
        let request = Message::get_providers(key.to_vec());
        let lookup = LookupEngine::new(self.clone(), target, request).run(|_, reply| {
            for entry in &reply.provider_peers {
                if entry.connectedness == Connectedness::CannotConnect
                    || entry.info.addrs.is_empty()
                {
                    continue;
                }
                if seen.insert(entry.info.id) {
                    self.address_book().upsert(
                        &entry.info.id,
                        &entry.info.addrs,
                        Some(ADDRESS_TTL),
                    );
                    collected.push(entry.info.clone());
                }
            }
            collected.len() < wanted
        });

        match lookup.await {
            Ok(_) => {}
            // A sparse table is fine if local records already had answers.
            Err(DhtError::NoSeeds) if !collected.is_empty() => {}
            Err(e) => return Err(e),
        }

        if collected.is_empty() {
            return Err(DhtError::NotFound);
        }
        collected.truncate(wanted);
        Ok(collected)
    }

    /// Announce this node as a provider of `key`.
    ///
    /// The local record is permanent; with `notify` set, the k peers
    /// nearest the key are told as well (no acknowledgement expected).
    pub async fn provide(&self, key: Key, notify: bool) -> Result<(), DhtError> {
        debug!(key = %hex_prefix(&key), notify, "CALL: Provide");

        self.add_provider_record(key.clone(), self.self_peer(), None)
            .await?;
        if !notify {
            return Ok(());
        }

        let target = NodeId::from_key(&key);
        let request = Message::find_node(key.clone());
        let outcome = LookupEngine::new(self.clone(), target, request)
            .run(|_, _| true)
            .await?;

        let announcement = Message::add_provider(
            key,
            MessagePeer {
                info: self.host().self_info(),
                connectedness: Connectedness::Connected,
            },
        );
        let addressees: Vec<PeerId> = outcome
            .closest
            .iter()
            .map(|info| info.id)
            .take(self.config().k)
            .collect();
        let _ = self.fan_out_send(addressees, announcement).await;
        Ok(())
    }

    /// Join the network: one immediate random-walk lookup to populate the
    /// routing table from whatever anchors are already known.
    pub async fn bootstrap(&self) -> Result<(), DhtError> {
        self.find_random_peer().await
    }

    /// FindPeer on a synthetic random id. `NotFound` is the expected
    /// outcome; the value is in the peers learned along the way.
    pub(crate) async fn find_random_peer(&self) -> Result<(), DhtError> {
        let mut raw = [0u8; 32];
        self.random().fill(&mut raw);
        let synthetic = PeerId::from_bytes(raw);
        trace!(target = %synthetic, "random walk");

        match self.find_peer(synthetic).await {
            Ok(info) => {
                self.add_peer(&info, false, false).await;
                Ok(())
            }
            Err(DhtError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Fan-out helpers (α-capped across sessions, one message per session)
    // ========================================================================

    /// Send `msg` to each peer on its own stream and count acknowledged
    /// exchanges.
    pub(crate) async fn fan_out_acked(&self, peers: Vec<PeerId>, msg: Message) -> usize {
        let mut pending = peers.into_iter();
        let mut join_set = JoinSet::new();
        let mut acks = 0usize;

        loop {
            while join_set.len() < self.config().alpha {
                let Some(peer) = pending.next() else { break };
                let node = self.clone();
                let msg = msg.clone();
                join_set.spawn(async move {
                    let deadline = node.config().response_timeout;
                    node.query_peer(&peer, &msg, deadline).await.is_ok()
                });
            }
            match join_set.join_next().await {
                Some(Ok(true)) => acks += 1,
                Some(_) => {}
                None => break,
            }
        }
        acks
    }

    /// Send `msg` to each peer on its own stream without waiting for
    /// replies. Returns the number of successful sends.
    pub(crate) async fn fan_out_send(&self, peers: Vec<PeerId>, msg: Message) -> usize {
        let mut pending = peers.into_iter();
        let mut join_set = JoinSet::new();
        let mut sent = 0usize;

        loop {
            while join_set.len() < self.config().alpha {
                let Some(peer) = pending.next() else { break };
                let node = self.clone();
                let msg = msg.clone();
                join_set.spawn(async move { node.send_one(&peer, &msg).await.is_ok() });
            }
            match join_set.join_next().await {
                Some(Ok(true)) => sent += 1,
                Some(_) => {}
                None => break,
            }
        }
        sent
    }
}
