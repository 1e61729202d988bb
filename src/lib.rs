//! A server-side RakNet reliability and encapsulation engine.
//!
//! RakNet turns an unreliable UDP socket into ordered, reliable, fragmented
//! message streams. This crate implements the server side of that layer:
//!
//! - [`server::Listener`] answers the offline handshake and accepts peers.
//! - [`connection::Connection`] is the async handle for one peer.
//! - [`connection::session::Session`] is the same pipeline without any IO,
//!   driven by explicit timestamps, which is what the tests use.
//!
//! The async runtime is chosen with the `async_std` (default) or `async_tokio` feature.

/// The configuration of the listener and of every connection it creates.
pub mod config;

/// The connection a peer has with the server. Contains the reliability engine,
/// the send and receive queues, and the async tasks driving them.
pub mod connection;
pub mod error;
pub mod metrics;
pub(crate) mod notify;

/// Home of the RakNet protocol.
/// This contains the wire types: sequence numbers, frames, ACKs and the
/// offline and online packets.
pub mod protocol;
pub mod server;
pub mod util;

pub use connection::Connection;
pub use server::Listener;

#[doc(hidden)]
pub use tracing;
