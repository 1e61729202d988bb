//! Small helpers shared by the connection and the listener.
mod debug;

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Formats a peer address as `ip:port`, the prefix every per-peer log line carries.
pub fn to_address_token(remote: SocketAddr) -> String {
    format!("{}:{}", remote.ip(), remote.port())
}

/// Seconds since the unix epoch, `0` if the clock is set before it.
pub fn current_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
