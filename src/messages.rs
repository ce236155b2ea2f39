//! Wire protocol messages and the frame codec.
//!
//! Every exchange on a DHT stream is one [`Message`] per direction. Messages
//! are serialized with bincode under a bounded deserialization limit and
//! framed with an unsigned-varint length prefix.
//!
//! Field identities are stable for wire compatibility:
//!
//! | `MessageType` | id | | `Connectedness` | id |
//! |---------------|----|-|-----------------|----|
//! | PutValue      | 0  | | NotConnected    | 0  |
//! | GetValue      | 1  | | Connected       | 1  |
//! | AddProvider   | 2  | | CanConnect      | 2  |
//! | GetProviders  | 3  | | CannotConnect   | 3  |
//! | FindNode      | 4  | | Unknown         | 4  |
//! | Ping          | 5  | |                 |    |
//!
//! The codec is pure; it never touches the network. Async frame helpers at
//! the bottom of this module move encoded messages over any tokio byte
//! stream.

use std::time::{SystemTime, UNIX_EPOCH};

use bincode::Options;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DhtError;
use crate::identity::{Key, PeerInfo};

/// Framing overhead allowed on top of the configured value-size limit.
pub(crate) const FRAME_SLACK: usize = 4096;

/// Longest accepted varint length prefix (u64, LEB128).
const MAX_VARINT_BYTES: usize = 10;

/// Seconds since the Unix epoch, for record receive stamps.
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn wire_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(limit as u64)
        .with_fixint_encoding()
}

/// Message type discriminant. Declaration order carries the wire id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    PutValue,
    GetValue,
    AddProvider,
    GetProviders,
    FindNode,
    Ping,
}

/// The host's cached verdict on reachability of a peer.
///
/// Tags travel on the wire as hints; `CannotConnect` entries are dropped
/// from reply lists and receivers re-resolve the rest themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectedness {
    NotConnected,
    Connected,
    CanConnect,
    CannotConnect,
    Unknown,
}

/// A stored value with its receive stamp, as carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub value: Vec<u8>,
    /// Seconds since epoch when the sender received the value, as ASCII
    /// decimal.
    pub time_received: String,
}

impl Record {
    pub fn new(key: Key, value: Vec<u8>, received_secs: u64) -> Self {
        Self {
            key,
            value,
            time_received: received_secs.to_string(),
        }
    }
}

/// A peer reference inside a reply, with the sender's connectedness verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePeer {
    pub info: PeerInfo,
    pub connectedness: Connectedness,
}

/// A DHT protocol message. Unused fields stay empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: MessageType,
    pub key: Key,
    pub record: Option<Record>,
    pub closer_peers: Vec<MessagePeer>,
    pub provider_peers: Vec<MessagePeer>,
}

impl Message {
    fn bare(message_type: MessageType, key: Key) -> Self {
        Self {
            message_type,
            key,
            record: None,
            closer_peers: Vec::new(),
            provider_peers: Vec::new(),
        }
    }

    pub fn find_node(key: Key) -> Self {
        Self::bare(MessageType::FindNode, key)
    }

    pub fn get_value(key: Key) -> Self {
        Self::bare(MessageType::GetValue, key)
    }

    pub fn get_providers(key: Key) -> Self {
        Self::bare(MessageType::GetProviders, key)
    }

    pub fn put_value(record: Record) -> Self {
        let mut msg = Self::bare(MessageType::PutValue, record.key.clone());
        msg.record = Some(record);
        msg
    }

    pub fn add_provider(key: Key, provider: MessagePeer) -> Self {
        let mut msg = Self::bare(MessageType::AddProvider, key);
        msg.provider_peers = vec![provider];
        msg
    }

    pub fn ping() -> Self {
        Self::bare(MessageType::Ping, Vec::new())
    }
}

/// Serialize a message. The limit also guards against oversized payloads
/// sneaking out of this node.
pub fn encode_message(msg: &Message, limit: usize) -> Result<Vec<u8>, DhtError> {
    wire_options(limit + FRAME_SLACK)
        .serialize(msg)
        .map_err(|_| DhtError::MalformedMessage)
}

/// Deserialize a message under the bounded limit.
pub fn decode_message(bytes: &[u8], limit: usize) -> Result<Message, DhtError> {
    wire_options(limit + FRAME_SLACK)
        .deserialize(bytes)
        .map_err(|_| DhtError::MalformedMessage)
}

// ============================================================================
// Frame I/O (unsigned-varint length prefix)
// ============================================================================

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), DhtError>
where
    W: AsyncWrite + Unpin,
{
    let mut prefix = [0u8; MAX_VARINT_BYTES];
    let mut len = payload.len() as u64;
    let mut used = 0;
    loop {
        let byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            prefix[used] = byte;
            used += 1;
            break;
        }
        prefix[used] = byte | 0x80;
        used += 1;
    }

    writer
        .write_all(&prefix[..used])
        .await
        .map_err(|_| DhtError::TransportClosed)?;
    writer
        .write_all(payload)
        .await
        .map_err(|_| DhtError::TransportClosed)?;
    writer.flush().await.map_err(|_| DhtError::TransportClosed)?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` on clean EOF at a frame boundary. EOF inside a frame
/// maps to `TransportClosed`; a prefix that overflows or exceeds `max_len`
/// maps to `MalformedMessage`.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, DhtError>
where
    R: AsyncRead + Unpin,
{
    let mut len: u64 = 0;
    let mut shift = 0u32;
    let mut first = true;
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if first && e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(_) => return Err(DhtError::TransportClosed),
        };
        first = false;

        if shift >= 64 {
            return Err(DhtError::MalformedMessage);
        }
        len |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }

    if len > max_len as u64 {
        return Err(DhtError::MalformedMessage);
    }

    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|_| DhtError::TransportClosed)?;
    Ok(Some(buf))
}

/// Encode and frame a message onto `writer`.
pub async fn write_message<W>(
    writer: &mut W,
    msg: &Message,
    limit: usize,
) -> Result<(), DhtError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg, limit)?;
    write_frame(writer, &bytes).await
}

/// Read and decode one framed message. `Ok(None)` on clean EOF.
pub async fn read_message<R>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<Message>, DhtError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, limit + FRAME_SLACK).await? {
        Some(bytes) => Ok(Some(decode_message(&bytes, limit)?)),
        None => Ok(None),
    }
}
