//! An optional sink for connection statistics.
//!
//! Every method has a no-op default, so an implementation only overrides the
//! counters it cares about. The listener and every connection share one sink,
//! which is why the trait requires `Send + Sync`.
use std::time::Duration;

pub trait Metrics: Send + Sync {
    /// Bytes written to the socket.
    fn incr_send(&self, _bytes: usize) {}
    /// Application packets handed to the reliability layer.
    fn incr_out_packet(&self, _count: usize) {}
    /// Bytes read from the socket.
    fn incr_recv(&self, _bytes: usize) {}
    /// Application packets delivered after reassembly and ordering.
    fn incr_in_packet(&self, _count: usize) {}
    /// Connections created by the listener.
    fn incr_join(&self, _count: usize) {}
    /// Datagrams retransmitted, by NACK or by the resend timer.
    fn incr_resend(&self, _count: usize) {}
    fn incr_ack_send(&self, _count: usize) {}
    fn incr_nack_send(&self, _count: usize) {}
    fn incr_ack_recv(&self, _count: usize) {}
    fn incr_nack_recv(&self, _count: usize) {}
    /// How many times a datagram was sent before it was acknowledged.
    fn measure_send_attempts(&self, _attempts: u32) {}
    fn measure_rtt(&self, _rtt: Duration) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}
