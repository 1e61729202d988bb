//! Error types for every layer of the crate.
//!
//! - [`ProtocolError`]: a peer broke the reliability protocol, always fatal for its connection.
//! - [`ConnectionError`]: anything that ends (or refuses) an operation on a [`Connection`].
//! - [`ServerError`]: errors from the [`Listener`] api.
//!
//! [`Connection`]: crate::connection::Connection
//! [`Listener`]: crate::server::Listener
pub mod connection;
pub mod protocol;
pub mod server;

pub use self::connection::ConnectionError;
pub use self::protocol::ProtocolError;
pub use self::server::ServerError;
