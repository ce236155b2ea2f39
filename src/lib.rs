//! # Rhizome - Kademlia DHT Node
//!
//! Rhizome is a node participant in a Kademlia-style distributed hash
//! table, layered on a host-provided peer-to-peer stream transport. It
//! provides:
//!
//! - **Content routing**: who can serve a given content key
//!   ([`Dht::provide`], [`Dht::find_providers`])
//! - **Peer routing**: how to reach a given peer ([`Dht::find_peer`])
//! - **Best-effort key/value storage** with validator-gated writes
//!   ([`Dht::put_value`], [`Dht::get_value`])
//!
//! ## Architecture
//!
//! The node uses the **Actor Pattern**: a public [`Dht`] handle, cheap to
//! clone, posts commands to a private actor that owns the routing table,
//! provider index, and value store. All table mutations are serialized by
//! the actor task; lookups run as spawned tasks holding handle clones.
//!
//! Transport, peer identity, and address management are external
//! collaborators behind trait seams ([`Host`], [`AddressBook`],
//! [`Validator`], [`RandomSource`]), so the same core runs over any stream
//! multiplexer the embedder wires in.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `identity` | Peer ids, node ids, XOR distance |
//! | `routing` | k-bucket peer routing table |
//! | `records` | provider index and value store |
//! | `messages` | wire messages, codec, varint framing |
//! | `session` | request/response over one stream |
//! | `lookup` | iterative α-concurrent lookup engine |
//! | `query` | FindPeer/GetValue/PutValue/Provide/FindProviders executors |
//! | `node` | handle, actor, inbound dispatcher, maintenance |
//! | `host` | contracts for external collaborators |
//!
//! ## Quick Start
//!
//! ```ignore
//! let node = Dht::spawn(my_host, Config::default());
//!
//! // Wire inbound protocol streams to the node:
//! //   node.handle_inbound_stream(remote_peer, stream).await
//!
//! node.add_peer(&bootstrap_info, true, false).await;
//! node.bootstrap().await?;
//!
//! node.put_value(b"key".to_vec(), b"value".to_vec()).await?;
//! let value = node.get_value(b"key").await?;
//! ```

mod config;
mod error;
mod host;
mod identity;
mod lookup;
mod messages;
mod node;
mod query;
mod records;
mod routing;
mod session;

pub use config::{Config, RandomWalkConfig, DEFAULT_ALPHA, DEFAULT_K, DEFAULT_PROTOCOL};
pub use error::DhtError;
pub use host::{
    AcceptAllValidator, AddressBook, DhtStream, Host, MemoryAddressBook, OsRandom, RandomSource,
    StreamIo, Validator,
};
pub use identity::{bucket_index, Distance, Key, NodeId, PeerId, PeerInfo};
pub use messages::{
    decode_message, encode_message, read_frame, read_message, write_frame, write_message,
    Connectedness, Message, MessagePeer, MessageType, Record,
};
pub use node::{Dht, DhtBuilder, DhtStats};
pub use records::{ProviderRoutingTable, ValueStore};
pub use routing::PeerRoutingTable;
