//! Error types surfaced by DHT operations.
//!
//! Transport, timeout, and decode failures during a lookup are local to one
//! candidate and never abort the lookup; only `NotFound`, `NoSeeds`,
//! `Timeout`, and `Cancelled` reach callers of the query API.

/// Errors produced by DHT operations and the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtError {
    /// The requested peer, value, or provider set could not be located.
    NotFound,
    /// The routing table held fewer peers than the lookup concurrency factor
    /// at the start of a query.
    NoSeeds,
    /// A response did not arrive within the configured deadline.
    Timeout,
    /// The operation was cancelled before completion.
    Cancelled,
    /// The underlying stream was closed or reset mid-exchange.
    TransportClosed,
    /// A frame or message failed to decode.
    MalformedMessage,
    /// The validator refused a record.
    ValidationRejected,
    /// A bucket is full of permanent entries and cannot accept the peer.
    BucketFull,
    /// Refused to open a stream to our own peer id.
    SelfDial,
    /// The DHT actor has shut down and can no longer serve requests.
    ActorClosed,
}

impl std::fmt::Display for DhtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DhtError::NotFound => "not found",
            DhtError::NoSeeds => "routing table has no usable seed peers",
            DhtError::Timeout => "response timeout elapsed",
            DhtError::Cancelled => "operation cancelled",
            DhtError::TransportClosed => "stream closed or reset",
            DhtError::MalformedMessage => "malformed frame or message",
            DhtError::ValidationRejected => "record rejected by validator",
            DhtError::BucketFull => "bucket full of permanent entries",
            DhtError::SelfDial => "refusing to dial own peer id",
            DhtError::ActorClosed => "DHT actor has shut down",
        };
        f.write_str(text)
    }
}

impl std::error::Error for DhtError {}
