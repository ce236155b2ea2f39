//! Request/response session over one byte stream.
//!
//! A session adapts a single duplex stream into framed [`Message`]
//! exchanges. Ownership enforces the single-writer rule; correlation is
//! positional, so one session carries exactly one outstanding request at a
//! time and concurrent requests to the same peer use separate streams.
//!
//! Dropping a session drops its stream, which is how cancellation and
//! timeout reset the transport.

use std::time::Duration;

use crate::error::DhtError;
use crate::host::DhtStream;
use crate::messages::{read_message, write_message, Message};

pub(crate) struct Session {
    stream: DhtStream,
    max_message_size: usize,
}

impl Session {
    pub fn new(stream: DhtStream, max_message_size: usize) -> Self {
        Self {
            stream,
            max_message_size,
        }
    }

    /// Read the next framed message. `Ok(None)` on clean EOF.
    pub async fn read(&mut self) -> Result<Option<Message>, DhtError> {
        read_message(&mut self.stream, self.max_message_size).await
    }

    /// Read the next framed message, giving up after `deadline`.
    pub async fn read_timeout(&mut self, deadline: Duration) -> Result<Option<Message>, DhtError> {
        match tokio::time::timeout(deadline, self.read()).await {
            Ok(result) => result,
            Err(_) => Err(DhtError::Timeout),
        }
    }

    /// Write one framed message.
    pub async fn write(&mut self, msg: &Message) -> Result<(), DhtError> {
        write_message(&mut self.stream, msg, self.max_message_size).await
    }

    /// One request/response exchange with a per-request deadline.
    ///
    /// EOF before a reply maps to `TransportClosed`; an elapsed deadline to
    /// `Timeout`. Either way the caller drops the session, resetting the
    /// stream.
    pub async fn request(&mut self, msg: &Message, deadline: Duration) -> Result<Message, DhtError> {
        self.write(msg).await?;
        match self.read_timeout(deadline).await? {
            Some(reply) => Ok(reply),
            None => Err(DhtError::TransportClosed),
        }
    }
}
