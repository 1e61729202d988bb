//! Configuration for connections and the listener.
//!
//! Every bound the reliability layer enforces is a value here rather than a
//! constant, so tests can run the same code paths with tiny windows.
use std::time::Duration;

use crate::protocol::MAX_FRAGS;

/// Limits and timings for the per-connection reliability layer.
///
/// ```rust
/// use rak_server::config::ReliabilityConfig;
/// use std::time::Duration;
///
/// let config = ReliabilityConfig::default()
///     .with_max_packet_loss(16)
///     .with_idle_timeout(Duration::from_secs(30));
/// assert_eq!(config.half_window(), 2048);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityConfig {
    /// Amount of sequence ids considered current around the last received id.
    pub window_size: u32,
    /// Upper bound on the ids one ACK/NACK may cover, and on the amount of
    /// unacknowledged datagrams in flight.
    pub max_packet_loss: u32,
    /// The RTT estimate never drops below this.
    pub rtt_floor: Duration,
    /// The RTT estimate used before any ACK has been observed.
    pub initial_rtt: Duration,
    /// Drop datagrams outside the receive window and frames whose reliable
    /// index was already seen.
    pub duplicate_detection: bool,
    /// Maximum fragments a single split payload may have.
    pub max_split_count: u32,
    /// Maximum split payloads that may be partially reassembled at once.
    pub max_pending_splits: usize,
    /// A connection that receives nothing for this long is closed.
    pub idle_timeout: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            max_packet_loss: 1024,
            rtt_floor: Duration::from_millis(5),
            initial_rtt: Duration::from_millis(2000),
            duplicate_detection: true,
            max_split_count: MAX_FRAGS,
            max_pending_splits: 64,
            idle_timeout: Duration::from_secs(10),
        }
    }
}

impl ReliabilityConfig {
    /// Half of [`window_size`](Self::window_size), never zero.
    pub fn half_window(&self) -> u32 {
        (self.window_size / 2).max(1)
    }

    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_max_packet_loss(mut self, max_packet_loss: u32) -> Self {
        self.max_packet_loss = max_packet_loss;
        self
    }

    pub fn with_rtt_floor(mut self, rtt_floor: Duration) -> Self {
        self.rtt_floor = rtt_floor;
        self
    }

    pub fn with_initial_rtt(mut self, initial_rtt: Duration) -> Self {
        self.initial_rtt = initial_rtt;
        self
    }

    pub fn with_duplicate_detection(mut self, enabled: bool) -> Self {
        self.duplicate_detection = enabled;
        self
    }

    pub fn with_max_split_count(mut self, max_split_count: u32) -> Self {
        self.max_split_count = max_split_count;
        self
    }

    pub fn with_max_pending_splits(mut self, max_pending_splits: usize) -> Self {
        self.max_pending_splits = max_pending_splits;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Settings for a [`Listener`](crate::server::Listener).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// RakNet protocol versions accepted during the handshake.
    pub protocol_versions: Vec<u8>,
    /// Requested MTUs above this are capped.
    pub max_mtu: u16,
    /// Applied to every accepted connection.
    pub reliability: ReliabilityConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol_versions: vec![10, 11],
            max_mtu: 2048,
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl ListenerConfig {
    pub fn with_protocol_versions(mut self, versions: &[u8]) -> Self {
        self.protocol_versions = versions.to_vec();
        self
    }

    pub fn with_max_mtu(mut self, max_mtu: u16) -> Self {
        self.max_mtu = max_mtu;
        self
    }

    pub fn with_reliability(mut self, reliability: ReliabilityConfig) -> Self {
        self.reliability = reliability;
        self
    }
}
