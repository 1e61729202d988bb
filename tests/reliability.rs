use std::sync::Arc;
use std::time::{Duration, Instant};

use rak_server::{
    config::ReliabilityConfig,
    connection::controller::reliability::{EngineState, ReliabilityEngine},
    error::{ConnectionError, ProtocolError},
    metrics::NoopMetrics,
    protocol::{
        ack::Ack,
        frame::{Frame, FramePacket},
        packet::DatagramPacket,
        reliability::Reliability,
        u24,
    },
};

fn engine(config: ReliabilityConfig) -> ReliabilityEngine {
    ReliabilityEngine::new(config, Arc::new(NoopMetrics))
}

fn datagram(sequence: u32) -> FramePacket {
    FramePacket::new(
        sequence,
        vec![Frame::new(Reliability::Unreliable, Some(&[sequence as u8]))],
    )
}

fn send_reliable(engine: &mut ReliabilityEngine, count: usize, now: Instant) {
    for _ in 0..count {
        engine
            .on_send(Frame::new(Reliability::Reliable, Some(&[0])), now)
            .unwrap();
    }
    engine.poll_transmit();
}

#[test]
fn gap_is_nacked() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    engine.set_last_received(7);

    let frames = engine.on_datagram(datagram(10), now);
    assert_eq!(frames.len(), 1);
    assert_eq!(engine.last_received(), 10);
    assert_eq!(
        engine.poll_transmit(),
        vec![
            DatagramPacket::Ack(Ack::single(10, false)),
            DatagramPacket::Nack(Ack::range(8, 9, true)),
        ]
    );
}

#[test]
fn first_datagram_is_fresh() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    assert_eq!(engine.last_received(), u24::MAX);

    engine.on_datagram(datagram(0), now);
    assert_eq!(engine.last_received(), 0);
    assert_eq!(
        engine.poll_transmit(),
        vec![DatagramPacket::Ack(Ack::single(0, false))]
    );
}

#[test]
fn duplicates_are_acked_again() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    engine.on_datagram(datagram(0), now);
    engine.on_datagram(datagram(1), now);
    engine.poll_transmit();

    // still handed up, the reliable index decides about duplicates
    assert_eq!(engine.on_datagram(datagram(0), now).len(), 1);
    assert_eq!(engine.last_received(), 1);
    assert_eq!(
        engine.poll_transmit(),
        vec![DatagramPacket::Ack(Ack::single(0, false))]
    );
}

#[test]
fn datagrams_outside_the_window_are_dropped() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    engine.on_datagram(datagram(0), now);
    engine.poll_transmit();

    assert!(engine.on_datagram(datagram(5000), now).is_empty());
    assert_eq!(engine.last_received(), 0);
    assert_eq!(
        engine.poll_transmit(),
        vec![DatagramPacket::Ack(Ack::single(5000, false))]
    );

    let mut lenient = self::engine(ReliabilityConfig::default().with_duplicate_detection(false));
    lenient.on_datagram(datagram(0), now);
    assert_eq!(lenient.on_datagram(datagram(5000), now).len(), 1);
}

#[test]
fn nack_after_ack_does_nothing() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    send_reliable(&mut engine, 8, now);

    engine.on_ack(&Ack::range(5, 7, false), now).unwrap();
    assert_eq!(engine.unacked(), 5);
    assert!(!engine.is_unacked(5));

    engine.on_nack(&Ack::single(5, true), now).unwrap();
    assert!(engine.poll_transmit().is_empty());
    assert_eq!(engine.unacked(), 5);
    assert_eq!(engine.next_send_sequence(), 8);
}

#[test]
fn nack_resends_under_a_new_sequence() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    send_reliable(&mut engine, 3, now);

    engine.on_nack(&Ack::range(0, 1, true), now).unwrap();
    let resent: Vec<u32> = engine
        .poll_transmit()
        .into_iter()
        .map(|packet| match packet {
            DatagramPacket::Frames(packet) => packet.sequence,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(resent, vec![3, 4]);
    assert!(engine.is_unacked(2) && engine.is_unacked(3) && engine.is_unacked(4));
    assert!(!engine.is_unacked(0));
}

#[test]
fn oversized_ack_range_is_fatal() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    send_reliable(&mut engine, 1, now);

    let err = engine.on_ack(&Ack::range(0, 2000, false), now).unwrap_err();
    assert_eq!(
        err,
        ConnectionError::Protocol(ProtocolError::AckRangeTooLarge {
            span: 2000,
            max: 1024
        })
    );
    assert_eq!(engine.state(), EngineState::Closing);
    assert_eq!(engine.unacked(), 0);
}

#[test]
fn unacked_overflow_is_fatal() {
    let mut engine = engine(ReliabilityConfig::default().with_max_packet_loss(4));
    let now = Instant::now();
    send_reliable(&mut engine, 4, now);
    assert_eq!(engine.unacked(), 4);

    // unreliable frames are never tracked
    engine
        .on_send(Frame::new(Reliability::Unreliable, Some(&[0])), now)
        .unwrap();

    let err = engine
        .on_send(Frame::new(Reliability::Reliable, Some(&[0])), now)
        .unwrap_err();
    assert_eq!(
        err,
        ConnectionError::Protocol(ProtocolError::UnackedOverflow { pending: 4, max: 4 })
    );
    assert_eq!(engine.state(), EngineState::Closing);
}

#[test]
fn rtt_never_drops_below_the_floor() {
    let config = ReliabilityConfig::default().with_rtt_floor(Duration::from_millis(5));
    let mut engine = engine(config);
    let now = Instant::now();
    send_reliable(&mut engine, 1, now);

    engine
        .on_ack(&Ack::single(0, false), now + Duration::from_millis(1))
        .unwrap();
    assert_eq!(engine.rtt(), Duration::from_millis(5));
}

#[test]
fn sequence_ids_wrap() {
    let mut engine = engine(ReliabilityConfig::default());
    let now = Instant::now();
    engine.set_last_received(u24::MAX - 1);
    engine.on_datagram(datagram(1), now);
    assert_eq!(engine.last_received(), 1);
    assert_eq!(
        engine.poll_transmit(),
        vec![
            DatagramPacket::Ack(Ack::single(1, false)),
            DatagramPacket::Nack(Ack::range(u24::MAX, 0, true)),
        ]
    );
}
