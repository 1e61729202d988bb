//! The complete per-connection pipeline, without any IO.
//!
//! Outbound: payload → [`SendQueue`] (order index, split) → [`ReliabilityEngine`]
//! (sequence id, unacked table) → encoded datagrams from [`Session::poll_transmit`].
//!
//! Inbound: bytes → [`DatagramPacket`] → [`ReliabilityEngine`] (ACK, gap NACK,
//! ACK/NACK processing) → [`RecvQueue`] (dedupe, reassembly, ordering) →
//! payloads returned from [`Session::handle_datagram`].
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//! use rak_server::config::ReliabilityConfig;
//! use rak_server::connection::session::Session;
//! use rak_server::metrics::NoopMetrics;
//! use rak_server::protocol::reliability::Reliability;
//!
//! let now = Instant::now();
//! let mut server = Session::new(1400, ReliabilityConfig::default(), Arc::new(NoopMetrics), now);
//! let mut client = Session::new(1400, ReliabilityConfig::default(), Arc::new(NoopMetrics), now);
//!
//! client.send(&[0xfe, 1, 2, 3], Reliability::ReliableOrd, 0, now).unwrap();
//! for datagram in client.poll_transmit() {
//!     let payloads = server.handle_datagram(&datagram, now).unwrap();
//!     assert_eq!(payloads, vec![vec![0xfe, 1, 2, 3]]);
//! }
//! ```
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ReliabilityConfig;
use crate::error::ConnectionError;
use crate::metrics::Metrics;
use crate::protocol::packet::DatagramPacket;
use crate::protocol::reliability::Reliability;

use super::controller::reliability::{EngineState, ReliabilityEngine};
use super::queue::{RecvQueue, SendQueue};

pub struct Session {
    config: ReliabilityConfig,
    metrics: Arc<dyn Metrics>,
    send_queue: SendQueue,
    recv_queue: RecvQueue,
    engine: ReliabilityEngine,
    last_activity: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mtu_size", &self.send_queue.mtu_size())
            .field("engine", &self.engine)
            .field("last_activity", &self.last_activity)
            .finish()
    }
}

impl Session {
    pub fn new(
        mtu_size: u16,
        config: ReliabilityConfig,
        metrics: Arc<dyn Metrics>,
        now: Instant,
    ) -> Self {
        Self {
            config,
            send_queue: SendQueue::new(mtu_size, config.max_split_count),
            recv_queue: RecvQueue::new(&config),
            engine: ReliabilityEngine::new(config, metrics.clone()),
            metrics,
            last_activity: now,
        }
    }

    /// Queues `payload` for the peer.
    ///
    /// An invalid channel or an oversized payload is refused without touching
    /// the connection, any other error closes it.
    pub fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<(), ConnectionError> {
        if self.engine.state() != EngineState::Active {
            return Err(ConnectionError::Closed);
        }

        for frame in self.send_queue.insert(payload, reliability, channel)? {
            self.engine.on_send(frame, now)?;
        }
        self.metrics.incr_out_packet(1);
        Ok(())
    }

    /// Feeds one datagram from the peer through the pipeline, returning the
    /// payloads that are now ready for the application, in order.
    pub fn handle_datagram(
        &mut self,
        bytes: &[u8],
        now: Instant,
    ) -> Result<Vec<Vec<u8>>, ConnectionError> {
        if self.engine.state() != EngineState::Active {
            return Err(ConnectionError::Closed);
        }

        self.last_activity = now;
        self.metrics.incr_recv(bytes.len());

        let packet = match DatagramPacket::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => return Err(self.fail(ConnectionError::Decode(e.to_string()))),
        };

        let handled = match packet {
            DatagramPacket::Frames(packet) => self
                .engine
                .on_datagram(packet, now)
                .into_iter()
                .try_for_each(|frame| self.recv_queue.insert(frame))
                .map_err(ConnectionError::from),
            DatagramPacket::Ack(ack) => self.engine.on_ack(&ack, now),
            DatagramPacket::Nack(nack) => self.engine.on_nack(&nack, now),
        };

        if let Err(e) = handled {
            return Err(self.fail(e));
        }

        let ready = self.recv_queue.flush();
        if !ready.is_empty() {
            self.metrics.incr_in_packet(ready.len());
        }
        Ok(ready)
    }

    /// Resend timer firing. Closes the connection if the peer has been silent
    /// for longer than the idle timeout.
    pub fn tick(&mut self, now: Instant) -> Result<(), ConnectionError> {
        if self.engine.state() != EngineState::Active {
            return Err(ConnectionError::Closed);
        }

        if now.saturating_duration_since(self.last_activity) >= self.config.idle_timeout {
            return Err(self.fail(ConnectionError::TimedOut));
        }

        self.engine.resend_tick(now);
        Ok(())
    }

    /// Encodes every datagram waiting to be sent. A datagram that cannot be
    /// encoded closes the session.
    pub fn poll_transmit(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for packet in self.engine.poll_transmit() {
            match packet.encode() {
                Ok(bytes) => {
                    self.metrics.incr_send(bytes.len());
                    out.push(bytes);
                }
                Err(e) => {
                    self.fail(ConnectionError::Encode(e.to_string()));
                    return Vec::new();
                }
            }
        }
        out
    }

    /// Period of the resend timer, the current RTT estimate.
    pub fn resend_interval(&self) -> Duration {
        self.engine.resend_interval()
    }

    /// Closes the session, everything still pending is discarded.
    pub fn close(&mut self) {
        self.engine.close();
        self.recv_queue.clear();
    }

    /// Marks the session as failed, for errors that happen outside of it
    /// (the socket refusing a datagram).
    pub fn fail(&mut self, error: ConnectionError) -> ConnectionError {
        self.recv_queue.clear();
        self.engine.fail(error)
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn is_active(&self) -> bool {
        self.engine.state() == EngineState::Active
    }

    pub fn engine(&self) -> &ReliabilityEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReliabilityEngine {
        &mut self.engine
    }

    pub fn mtu_size(&self) -> u16 {
        self.send_queue.mtu_size()
    }
}
