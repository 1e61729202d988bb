//! # Connection Error
//! These error types are used when an error occurs within the [`Connection`] or
//! the [`Session`] it drives.
//!
//! [`Connection`]: crate::connection::Connection
//! [`Session`]: crate::connection::session::Session
use thiserror::Error;

use super::ProtocolError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection is closing or closed, nothing more can be sent or received.
    #[error("connection is closed")]
    Closed,

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer sent bytes that do not decode.
    #[error("malformed datagram: {0}")]
    Decode(String),

    /// An outgoing datagram could not be encoded.
    #[error("failed to encode datagram: {0}")]
    Encode(String),

    /// The socket refused a datagram.
    #[error("transport error: {0}")]
    Transport(String),

    /// Nothing was received for longer than the idle timeout.
    #[error("connection timed out")]
    TimedOut,

    /// The payload would need more fragments than the peer accepts.
    /// Rejected before any state changes, the connection stays open.
    #[error("payload of {size} bytes is larger than the maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Rejected before any state changes, the connection stays open.
    #[error("order channel {0} is out of range")]
    InvalidChannel(u8),
}

impl ConnectionError {
    /// Whether this error ends the connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConnectionError::PayloadTooLarge { .. } | ConnectionError::InvalidChannel(_)
        )
    }
}
