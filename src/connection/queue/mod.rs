//! The per-connection queues.
//!
//! - [`RecoveryQueue`]: datagrams sent reliably and not yet acknowledged.
//! - [`FragmentQueue`]: splits oversized frames, and reassembles incoming splits.
//! - [`OrderedQueue`] / [`SequencedQueue`]: inbound ordering, one per channel.
//! - [`SendQueue`] / [`RecvQueue`]: the outbound and inbound encapsulation stages
//!   built from the queues above.
pub(crate) mod recv;
pub(crate) mod send;

pub use self::recv::*;
pub use self::send::*;

use std::collections::HashMap;
use std::time::Instant;

use crate::error::ProtocolError;
use crate::protocol::frame::{FragmentMeta, Frame, FramePacket};
use crate::protocol::u24;
use crate::protocol::MAX_FRAGS;

/// A datagram waiting for its ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub packet: FramePacket,
    /// When this copy of the datagram was last put on the wire.
    pub sent_at: Instant,
    /// Once this passes without an ACK, the resend timer retransmits it.
    pub resend_at: Instant,
    /// How many times the datagram has been sent, including the first time.
    pub attempts: u32,
}

/// The unacknowledged-send table, keyed by datagram sequence id.
#[derive(Debug, Clone, Default)]
pub struct RecoveryQueue {
    queue: HashMap<u32, SentDatagram>,
}

impl RecoveryQueue {
    pub fn new() -> Self {
        Self {
            queue: HashMap::new(),
        }
    }

    /// Tracks `datagram` under its current sequence id.
    pub fn insert(&mut self, datagram: SentDatagram) {
        self.queue.insert(datagram.packet.sequence, datagram);
    }

    pub fn remove(&mut self, sequence: u32) -> Option<SentDatagram> {
        self.queue.remove(&sequence)
    }

    pub fn get(&self, sequence: u32) -> Option<&SentDatagram> {
        self.queue.get(&sequence)
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.queue.contains_key(&sequence)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sequence ids whose resend deadline has passed, oldest send first.
    pub fn expired(&self, now: Instant) -> Vec<u32> {
        let mut expired = self
            .queue
            .values()
            .filter(|sent| sent.resend_at <= now)
            .map(|sent| (sent.sent_at, sent.packet.sequence))
            .collect::<Vec<_>>();
        expired.sort();
        expired.into_iter().map(|(_, seq)| seq).collect()
    }

    /// The reliable index furthest behind `next` among the tracked datagrams.
    pub fn oldest_reliable_index(&self, next: u32) -> Option<u32> {
        self.queue
            .values()
            .flat_map(|sent| sent.packet.frames.iter())
            .filter_map(|frame| frame.reliable_index)
            .max_by_key(|index| u24::minus_wrap(next, *index))
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[derive(Debug, Clone)]
struct Reassembly {
    /// Header of the first fragment seen, its body is left empty.
    header: Frame,
    parts: Vec<Option<Vec<u8>>>,
    received: u32,
}

/// A specialized structure for splitting frames over the wire, and putting
/// them back together on the other side.
///
/// **NOTE:** This structure will NOT update a frame's reliable index!
/// Fragments are stamped by the reliability engine like any other frame.
#[derive(Clone, Debug)]
pub struct FragmentQueue {
    /// The split id given to the next payload that needs splitting.
    fragment_id: u16,
    /// Incoming splits, by split id.
    fragments: HashMap<u16, Reassembly>,
    max_split_count: u32,
    max_pending: usize,
}

impl Default for FragmentQueue {
    fn default() -> Self {
        Self::new(MAX_FRAGS, 64)
    }
}

impl FragmentQueue {
    pub fn new(max_split_count: u32, max_pending: usize) -> Self {
        Self {
            fragment_id: 0,
            fragments: HashMap::new(),
            max_split_count,
            max_pending,
        }
    }

    /// Splits `frame` into fragments of at most `max_size` bytes.
    ///
    /// Frames that already fit are returned untouched. Every fragment keeps the
    /// reliability and ordering fields of the original and carries the same,
    /// freshly assigned, split id.
    pub fn split(&mut self, frame: Frame, max_size: usize) -> Result<Vec<Frame>, ProtocolError> {
        let max_size = max_size.max(1);
        if frame.body.len() <= max_size {
            return Ok(vec![frame]);
        }

        let count = (frame.body.len() + max_size - 1) / max_size;
        if count > self.max_split_count as usize {
            return Err(ProtocolError::TooManySplits {
                count: count.min(u32::MAX as usize) as u32,
                max: self.max_split_count,
            });
        }

        let id = self.fragment_id;
        self.fragment_id = self.fragment_id.wrapping_add(1);

        Ok(frame
            .body
            .chunks(max_size)
            .enumerate()
            .map(|(index, chunk)| Frame {
                reliability: frame.reliability,
                reliable_index: frame.reliable_index,
                order_index: frame.order_index,
                order_channel: frame.order_channel,
                fragment_meta: Some(FragmentMeta::new(count as u32, id, index as u32)),
                body: chunk.to_vec(),
            })
            .collect())
    }

    /// Inserts an incoming frame.
    ///
    /// Frames that aren't fragments pass straight through. A fragment returns
    /// `None` until its last missing sibling arrives, at which point the whole
    /// payload is returned as one unsplit frame. A fragment index that was
    /// already received is ignored.
    pub fn insert(&mut self, fragment: Frame) -> Result<Option<Frame>, ProtocolError> {
        let meta = match fragment.fragment_meta {
            Some(meta) => meta,
            None => return Ok(Some(fragment)),
        };

        if meta.size == 0 || meta.size > self.max_split_count {
            return Err(ProtocolError::TooManySplits {
                count: meta.size,
                max: self.max_split_count,
            });
        }

        if meta.index >= meta.size {
            return Err(ProtocolError::FragmentIndexOutOfBounds {
                index: meta.index,
                count: meta.size,
            });
        }

        if !self.fragments.contains_key(&meta.id) {
            if self.fragments.len() >= self.max_pending {
                return Err(ProtocolError::TooManyPendingSplits {
                    max: self.max_pending,
                });
            }

            let mut header = fragment.clone();
            header.body = Vec::new();
            header.fragment_meta = None;

            self.fragments.insert(
                meta.id,
                Reassembly {
                    header,
                    parts: vec![None; meta.size as usize],
                    received: 0,
                },
            );
        }

        let complete = match self.fragments.get_mut(&meta.id) {
            Some(pending) => {
                if pending.parts.len() != meta.size as usize {
                    return Err(ProtocolError::FragmentIndexOutOfBounds {
                        index: meta.index,
                        count: pending.parts.len() as u32,
                    });
                }

                let slot = &mut pending.parts[meta.index as usize];
                if slot.is_none() {
                    *slot = Some(fragment.body);
                    pending.received += 1;
                }

                pending.received == meta.size
            }
            None => false,
        };

        if !complete {
            return Ok(None);
        }

        Ok(self.fragments.remove(&meta.id).map(|pending| {
            let mut frame = pending.header;
            frame.body = pending.parts.into_iter().flatten().flatten().collect();
            frame
        }))
    }

    /// Amount of split payloads that are partially received.
    pub fn pending(&self) -> usize {
        self.fragments.len()
    }

    /// Drops every partial reassembly.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

/// Holds back ordered frames of one channel until every earlier order index
/// has been delivered.
#[derive(Debug, Clone)]
pub struct OrderedQueue<Item> {
    queue: HashMap<u32, Item>,
    /// The next order index to deliver.
    expected: u32,
    /// Indexes this far ahead of `expected` or further are dropped.
    half_window: u32,
}

impl<Item> OrderedQueue<Item> {
    pub fn new(half_window: u32) -> Self {
        Self {
            queue: HashMap::new(),
            expected: 0,
            half_window,
        }
    }

    /// Buffers `item` under `index`. Returns `false` if the index was already
    /// delivered, is already buffered, or is too far ahead to be current.
    pub fn insert(&mut self, index: u32, item: Item) -> bool {
        let distance = u24::minus_wrap(index, self.expected);
        if distance < 0 || distance as u32 >= self.half_window {
            return false;
        }

        if self.queue.contains_key(&index) {
            return false;
        }

        self.queue.insert(index, item);
        true
    }

    /// Removes the run of consecutive items starting at the expected index.
    pub fn flush(&mut self) -> Vec<Item> {
        let mut items = Vec::<Item>::new();
        while let Some(item) = self.queue.remove(&self.expected) {
            items.push(item);
            self.expected = u24::plus_one(self.expected);
        }
        items
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Amount of items waiting for a gap to be filled.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// "Latest wins" filter for the sequenced frames of one channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencedQueue {
    expected: u32,
}

impl SequencedQueue {
    pub fn new() -> Self {
        Self { expected: 0 }
    }

    /// Whether the frame with `index` should be delivered. Anything older than
    /// the newest index delivered so far is stale.
    pub fn insert(&mut self, index: u32) -> bool {
        if u24::minus_wrap(index, self.expected) < 0 {
            return false;
        }
        self.expected = u24::plus_one(index);
        true
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reliability::Reliability;
    use std::time::Duration;

    #[test]
    fn recovery_expired_oldest_first() {
        let now = Instant::now();
        let mut queue = RecoveryQueue::new();
        for (seq, age) in [(4u32, 30u64), (9, 50), (2, 10)] {
            let sent_at = now - Duration::from_millis(age);
            queue.insert(SentDatagram {
                packet: FramePacket::new(seq, Vec::new()),
                sent_at,
                resend_at: sent_at + Duration::from_millis(20),
                attempts: 1,
            });
        }
        assert_eq!(queue.expired(now), vec![9, 4]);
        assert!(queue.remove(9).is_some());
        assert!(queue.remove(9).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn split_keeps_headers() {
        let mut queue = FragmentQueue::default();
        let mut frame = Frame::new(Reliability::ReliableOrd, Some(&[0u8; 10])).with_order(2, 7);
        frame.reliable_index = Some(1);

        let parts = queue.split(frame, 4).unwrap();
        assert_eq!(parts.len(), 3);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.order_channel, Some(2));
            assert_eq!(part.order_index, Some(7));
            assert_eq!(part.fragment_meta, Some(FragmentMeta::new(3, 0, i as u32)));
        }
        assert_eq!(parts[2].body.len(), 2);

        let next = queue
            .split(Frame::new(Reliability::Reliable, Some(&[0u8; 5])), 4)
            .unwrap();
        assert_eq!(next[0].fragment_meta.map(|m| m.id), Some(1));
    }

    #[test]
    fn split_bounded() {
        let mut queue = FragmentQueue::new(2, 1);
        assert_eq!(
            queue.split(Frame::new(Reliability::Reliable, Some(&[0u8; 9])), 3),
            Err(ProtocolError::TooManySplits { count: 3, max: 2 })
        );
    }

    #[test]
    fn pending_splits_bounded() {
        let mut queue = FragmentQueue::new(8, 1);
        let first = Frame::new(Reliability::Reliable, Some(&[1])).with_meta(FragmentMeta::new(2, 1, 0));
        let other = Frame::new(Reliability::Reliable, Some(&[1])).with_meta(FragmentMeta::new(2, 2, 0));
        assert_eq!(queue.insert(first), Ok(None));
        assert_eq!(
            queue.insert(other),
            Err(ProtocolError::TooManyPendingSplits { max: 1 })
        );
    }

    #[test]
    fn ordered_wraps() {
        let mut queue = OrderedQueue::new(16);
        queue.expected = u24::MAX;
        assert!(queue.insert(0, "b"));
        assert!(queue.insert(u24::MAX, "a"));
        assert_eq!(queue.flush(), vec!["a", "b"]);
        assert_eq!(queue.expected(), 1);
        // too far ahead
        assert!(!queue.insert(17, "c"));
    }

    #[test]
    fn sequenced_drops_stale() {
        let mut queue = SequencedQueue::new();
        assert!(queue.insert(0));
        assert!(queue.insert(5));
        assert!(!queue.insert(3));
        assert!(!queue.insert(5));
        assert!(queue.insert(6));
    }
}
