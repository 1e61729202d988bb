//! Server errors are errors that can occur when using the [`Listener`](crate::server::Listener) api.
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServerError {
    /// The address is invalid or already in use.
    #[error("unable to bind to address")]
    AddrBindErr,
    /// [`Listener::start`](crate::server::Listener::start) was called twice.
    #[error("listener is already online")]
    AlreadyOnline,
    /// The listener was never started, or has been stopped.
    #[error("listener is not listening")]
    NotListening,
    /// The listener shut down while waiting for a connection.
    #[error("listener has been killed")]
    Killed,
}
