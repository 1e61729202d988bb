/// Connection States
/// The handshake progress of a [`Connection`](crate::connection::Connection),
/// as seen from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The offline handshake is done, but the peer hasn't sent a
    /// `ConnectionRequest` yet.
    Unidentified,

    /// The server has answered the `ConnectionRequest` and is waiting for
    /// `NewConnection`.
    Connecting,

    /// The handshake is complete.
    Connected,

    /// A fatal error occurred or the peer disconnected. The connection is
    /// shutting down its tasks.
    Disconnecting,

    /// Every task has stopped and all state is released.
    Disconnected,
}

impl ConnectionState {
    /// Returns whether or not the connection can still send and receive.
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            Self::Unidentified | Self::Connecting | Self::Connected
        )
    }

    /// Returns whether or not the peer finished the online handshake.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_closed(&self) -> bool {
        !self.is_available()
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unidentified => write!(f, "Unidentified"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}
