use rak_server::{
    config::ReliabilityConfig,
    connection::queue::{OrderedQueue, RecvQueue, SequencedQueue},
    error::ProtocolError,
    protocol::{frame::Frame, reliability::Reliability, u24},
};

fn ordered(channel: u8, index: u32, body: u8) -> Frame {
    Frame::new(Reliability::ReliableOrd, Some(&[body])).with_order(channel, index)
}

fn sequenced(channel: u8, index: u32, body: u8) -> Frame {
    Frame::new(Reliability::UnreliableSeq, Some(&[body])).with_order(channel, index)
}

#[test]
fn ordered_frames_wait_for_the_gap() {
    let mut queue = RecvQueue::new(&ReliabilityConfig::default());

    queue.insert(ordered(0, 2, 2)).unwrap();
    assert!(queue.flush().is_empty());
    queue.insert(ordered(0, 0, 0)).unwrap();
    assert_eq!(queue.flush(), vec![vec![0]]);
    queue.insert(ordered(0, 1, 1)).unwrap();
    assert_eq!(queue.flush(), vec![vec![1], vec![2]]);
}

#[test]
fn channels_are_independent() {
    let mut queue = RecvQueue::new(&ReliabilityConfig::default());

    queue.insert(ordered(1, 1, 11)).unwrap();
    queue.insert(ordered(2, 0, 20)).unwrap();
    assert_eq!(queue.flush(), vec![vec![20]]);
    queue.insert(ordered(1, 0, 10)).unwrap();
    assert_eq!(queue.flush(), vec![vec![10], vec![11]]);
}

#[test]
fn sequenced_frames_drop_stale_indexes() {
    let mut queue = RecvQueue::new(&ReliabilityConfig::default());

    queue.insert(sequenced(0, 0, 0)).unwrap();
    queue.insert(sequenced(0, 2, 2)).unwrap();
    queue.insert(sequenced(0, 1, 1)).unwrap();
    assert_eq!(queue.flush(), vec![vec![0], vec![2]]);
}

#[test]
fn out_of_range_channel_is_a_violation() {
    let mut queue = RecvQueue::new(&ReliabilityConfig::default());
    assert_eq!(
        queue.insert(ordered(32, 0, 0)),
        Err(ProtocolError::InvalidChannel(32))
    );
}

#[test]
fn unordered_frames_pass_straight_through() {
    let mut queue = RecvQueue::new(&ReliabilityConfig::default());
    queue.insert(Frame::new(Reliability::Unreliable, Some(&[7]))).unwrap();
    assert_eq!(queue.flush(), vec![vec![7]]);
}

#[test]
fn ordered_queue_drops_old_and_far_indexes() {
    let mut queue = OrderedQueue::new(16);
    assert!(queue.insert(0, 'a'));
    assert_eq!(queue.flush(), vec!['a']);

    // already delivered
    assert!(!queue.insert(0, 'b'));
    // too far ahead
    assert!(!queue.insert(17, 'c'));
    assert!(queue.insert(16, 'd'));
    assert!(!queue.insert(16, 'e'));
    assert_eq!(queue.len(), 1);
    assert!(queue.flush().is_empty());
    assert_eq!(queue.expected(), 1);
}

#[test]
fn sequenced_queue_crosses_the_wrap() {
    let mut queue = SequencedQueue::new();
    assert!(queue.insert(u24::SPACE / 2 - 1));
    assert!(queue.insert(u24::MAX));
    assert_eq!(queue.expected(), 0);
    assert!(queue.insert(0));
    assert!(!queue.insert(u24::MAX));
}
