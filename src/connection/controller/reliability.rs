use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::ReliabilityConfig;
use crate::connection::queue::{RecoveryQueue, SentDatagram};
use crate::error::{ConnectionError, ProtocolError};
use crate::metrics::Metrics;
use crate::protocol::ack::Ack;
use crate::protocol::frame::{Frame, FramePacket};
use crate::protocol::packet::DatagramPacket;
use crate::protocol::u24;
use crate::rakrs_debug;

use super::rtt::RttEstimator;
use super::window::{Arrival, ReceiveWindow};

/// Lifecycle of the reliability layer of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Active,
    /// A fatal error occurred, all pending state has been released and
    /// nothing else is sent or accepted.
    Closing,
    /// Terminal.
    Closed,
}

/// The sliding-window reliability layer of one connection.
///
/// Every frame sent becomes its own datagram with the next 24-bit sequence id.
/// Reliable datagrams stay in the [`RecoveryQueue`] until the peer ACKs them,
/// and are retransmitted under a fresh id when NACKed or when their resend
/// deadline passes. Incoming datagrams are ACKed straight away and gaps in
/// the sequence are NACKed.
///
/// Reliable frames are only put on the wire while their reliable index stays
/// within `window_size` of the oldest unacknowledged one, the peer drops
/// anything further ahead. Frames past that point are held back in send order
/// until ACKs move the window.
///
/// The engine does no IO: datagrams to send pile up until
/// [`poll_transmit`](Self::poll_transmit), and time is passed in by the caller.
pub struct ReliabilityEngine {
    config: ReliabilityConfig,
    metrics: Arc<dyn Metrics>,
    state: EngineState,
    /// The sequence id of the next datagram sent.
    send_sequence: u32,
    /// The reliable message index of the next reliable frame.
    reliable_index: u32,
    recovery: RecoveryQueue,
    /// Reliable frames waiting for the reliable window to move.
    held: VecDeque<Frame>,
    window: ReceiveWindow,
    rtt: RttEstimator,
    outbox: VecDeque<DatagramPacket>,
}

impl std::fmt::Debug for ReliabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityEngine")
            .field("state", &self.state)
            .field("send_sequence", &self.send_sequence)
            .field("unacked", &self.recovery.len())
            .field("held", &self.held.len())
            .field("last_received", &self.window.last())
            .field("rtt", &self.rtt.estimate())
            .finish()
    }
}

impl ReliabilityEngine {
    pub fn new(config: ReliabilityConfig, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            config,
            metrics,
            state: EngineState::Active,
            send_sequence: 0,
            reliable_index: 0,
            recovery: RecoveryQueue::new(),
            held: VecDeque::new(),
            window: ReceiveWindow::new(config.half_window(), config.max_packet_loss),
            rtt: RttEstimator::new(config.initial_rtt, config.rtt_floor),
            outbox: VecDeque::new(),
        }
    }

    /// Wraps `frame` into a datagram and queues it for sending.
    ///
    /// Reliable frames are stamped with a reliable message index (kept across
    /// retransmissions) and tracked until acknowledged, or held back while the
    /// reliable window is full. Fails fatally once `max_packet_loss` reliable
    /// frames are waiting on the peer.
    pub fn on_send(&mut self, frame: Frame, now: Instant) -> Result<(), ConnectionError> {
        self.ensure_active()?;

        if frame.reliability.is_reliable() {
            let pending = self.recovery.len() + self.held.len();
            if pending >= self.config.max_packet_loss as usize {
                return Err(self.fail(ProtocolError::UnackedOverflow {
                    pending,
                    max: self.config.max_packet_loss,
                }));
            }

            // keeps send order behind frames already waiting
            if !self.held.is_empty() || self.window_full() {
                self.held.push_back(frame);
                return Ok(());
            }
        }

        self.transmit(frame, now);
        Ok(())
    }

    fn transmit(&mut self, mut frame: Frame, now: Instant) {
        let reliable = frame.reliability.is_reliable();

        if reliable && frame.reliable_index.is_none() {
            frame.reliable_index = Some(self.reliable_index);
            self.reliable_index = u24::plus_one(self.reliable_index);
        }

        let packet = FramePacket::new(self.next_sequence(), vec![frame]);

        if reliable {
            self.recovery.insert(SentDatagram {
                packet: packet.clone(),
                sent_at: now,
                resend_at: now + self.resend_delay(),
                attempts: 1,
            });
        }

        self.outbox.push_back(packet.into());
    }

    /// Whether the next reliable index would land `window_size` or more ahead
    /// of the oldest one the peer has not acknowledged.
    fn window_full(&self) -> bool {
        match self.recovery.oldest_reliable_index(self.reliable_index) {
            Some(oldest) => {
                u24::minus_wrap(self.reliable_index, oldest)
                    >= self.config.window_size.max(1) as i32
            }
            None => false,
        }
    }

    fn release_held(&mut self, now: Instant) {
        while !self.held.is_empty() && !self.window_full() {
            if let Some(frame) = self.held.pop_front() {
                self.transmit(frame, now);
            }
        }
    }

    /// Handles an incoming frame datagram, returning the frames it carries that
    /// should go up the pipeline.
    pub fn on_datagram(&mut self, packet: FramePacket, _now: Instant) -> Vec<Frame> {
        if self.state != EngineState::Active {
            return Vec::new();
        }

        self.outbox.push_back(Ack::single(packet.sequence, false).into());
        self.metrics.incr_ack_send(1);

        match self.window.insert(packet.sequence) {
            Arrival::Fresh { missing } => {
                if let Some((start, end)) = missing {
                    rakrs_debug!(true, "missing datagrams {} to {}, sending nack", start, end);
                    self.outbox.push_back(Ack::range(start, end, true).into());
                    self.metrics.incr_nack_send(1);
                }
            }
            Arrival::Stale => {}
            Arrival::OutOfWindow => {
                if self.config.duplicate_detection {
                    rakrs_debug!(
                        "dropping datagram {} outside of the window around {}",
                        packet.sequence,
                        self.window.last()
                    );
                    return Vec::new();
                }
            }
        }

        packet.frames
    }

    /// Removes every acknowledged datagram from the unacked table, measuring
    /// the round trip of each one found.
    pub fn on_ack(&mut self, ack: &Ack, now: Instant) -> Result<(), ConnectionError> {
        if self.state != EngineState::Active {
            return Ok(());
        }

        let ids = self.expand(ack)?;
        self.metrics.incr_ack_recv(1);

        for id in ids {
            if let Some(sent) = self.recovery.remove(id) {
                let measured = now.saturating_duration_since(sent.sent_at);
                self.rtt.update(measured);
                self.metrics.measure_rtt(measured);
                self.metrics.measure_send_attempts(sent.attempts);
            }
        }
        self.release_held(now);
        Ok(())
    }

    /// Retransmits every NACKed datagram that is still unacknowledged.
    pub fn on_nack(&mut self, nack: &Ack, now: Instant) -> Result<(), ConnectionError> {
        if self.state != EngineState::Active {
            return Ok(());
        }

        let ids = self.expand(nack)?;
        self.metrics.incr_nack_recv(1);

        for id in ids {
            if let Some(sent) = self.recovery.remove(id) {
                self.retransmit(sent, now);
            }
        }
        Ok(())
    }

    /// Resend timer body: retransmits every datagram past its deadline.
    /// Returns how many were resent.
    pub fn resend_tick(&mut self, now: Instant) -> usize {
        if self.state != EngineState::Active {
            return 0;
        }

        let expired = self.recovery.expired(now);
        let count = expired.len();
        for id in expired {
            if let Some(sent) = self.recovery.remove(id) {
                self.retransmit(sent, now);
            }
        }
        count
    }

    /// How long until the resend timer should fire again.
    pub fn resend_interval(&self) -> Duration {
        self.rtt.estimate().max(self.config.rtt_floor)
    }

    /// Takes every datagram queued for sending.
    pub fn poll_transmit(&mut self) -> Vec<DatagramPacket> {
        self.outbox.drain(..).collect()
    }

    /// Moves the engine to `Closing` and releases all pending state, returning
    /// the error for the caller to propagate.
    pub fn fail(&mut self, error: impl Into<ConnectionError>) -> ConnectionError {
        let error = error.into();
        if self.state == EngineState::Active {
            warn!("closing connection: {}", error);
            self.state = EngineState::Closing;
        }
        self.recovery.clear();
        self.held.clear();
        self.outbox.clear();
        error
    }

    /// Discards everything, nothing pending is delivered.
    pub fn close(&mut self) {
        self.state = EngineState::Closed;
        self.recovery.clear();
        self.held.clear();
        self.outbox.clear();
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn rtt(&self) -> Duration {
        self.rtt.estimate()
    }

    /// Amount of reliable datagrams waiting for an ACK.
    pub fn unacked(&self) -> usize {
        self.recovery.len()
    }

    /// Reliable frames waiting for the reliable window to move.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    pub fn is_unacked(&self, sequence: u32) -> bool {
        self.recovery.contains(sequence)
    }

    /// The newest datagram sequence id received from the peer.
    pub fn last_received(&self) -> u32 {
        self.window.last()
    }

    /// Overrides the newest received sequence id, used to resume a window.
    pub fn set_last_received(&mut self, sequence: u32) {
        self.window.set_last(sequence);
    }

    /// The sequence id the next datagram will get.
    pub fn next_send_sequence(&self) -> u32 {
        self.send_sequence
    }

    fn ensure_active(&self) -> Result<(), ConnectionError> {
        match self.state {
            EngineState::Active => Ok(()),
            _ => Err(ConnectionError::Closed),
        }
    }

    fn expand(&mut self, ack: &Ack) -> Result<Vec<u32>, ConnectionError> {
        ack.sequences(self.config.max_packet_loss)
            .map_err(|e| self.fail(e))
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = u24::plus_one(self.send_sequence);
        sequence
    }

    fn resend_delay(&self) -> Duration {
        self.rtt.estimate() * 2
    }

    fn retransmit(&mut self, mut sent: SentDatagram, now: Instant) {
        let old = sent.packet.sequence;
        sent.packet.sequence = self.next_sequence();
        sent.sent_at = now;
        sent.resend_at = now + self.resend_delay();
        sent.attempts += 1;

        rakrs_debug!(
            true,
            "resending datagram {} as {} (attempt {})",
            old,
            sent.packet.sequence,
            sent.attempts
        );

        self.outbox.push_back(sent.packet.clone().into());
        self.recovery.insert(sent);
        self.metrics.incr_resend(1);
    }
}
