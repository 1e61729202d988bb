use crate::error::ConnectionError;
use crate::protocol::frame::Frame;
use crate::protocol::reliability::Reliability;
use crate::protocol::{u24, MAX_FRAME_BODY, MAX_ORD_CHANS, RAKNET_FRAGMENT_OVERHEAD};

use super::FragmentQueue;

/// The outbound half of the encapsulation pipeline.
///
/// Stamps ordered and sequenced payloads with the next order index of their
/// channel, then splits anything that doesn't fit in one datagram. The frames
/// it produces go to the reliability engine as they are.
#[derive(Debug, Clone)]
pub struct SendQueue {
    /// The negotiated MTU of the connection.
    mtu_size: u16,
    /// The next order index to assign, per channel.
    order_indexes: [u32; MAX_ORD_CHANS as usize],
    fragments: FragmentQueue,
    max_split_count: u32,
}

impl SendQueue {
    pub fn new(mtu_size: u16, max_split_count: u32) -> Self {
        Self {
            mtu_size,
            order_indexes: [0; MAX_ORD_CHANS as usize],
            fragments: FragmentQueue::new(max_split_count, 0),
            max_split_count,
        }
    }

    /// The largest body a single frame may carry at this MTU, never more than
    /// the frame length field can express.
    pub fn max_fragment_size(&self) -> usize {
        (self.mtu_size.saturating_sub(RAKNET_FRAGMENT_OVERHEAD).max(1) as usize)
            .min(MAX_FRAME_BODY)
    }

    /// The largest payload that can be sent at all.
    pub fn max_payload_size(&self) -> usize {
        self.max_fragment_size()
            .saturating_mul(self.max_split_count as usize)
    }

    /// Encapsulates `payload` into one or more frames.
    ///
    /// Invalid channels and payloads that would need too many fragments are
    /// rejected before any order index is consumed.
    pub fn insert(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
    ) -> Result<Vec<Frame>, ConnectionError> {
        if channel >= MAX_ORD_CHANS {
            return Err(ConnectionError::InvalidChannel(channel));
        }

        if payload.len() > self.max_payload_size() {
            return Err(ConnectionError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size(),
            });
        }

        let mut frame = Frame::new(reliability, Some(payload));

        if reliability.is_sequenced_or_ordered() {
            let index = &mut self.order_indexes[channel as usize];
            frame = frame.with_order(channel, *index);
            *index = u24::plus_one(*index);
        }

        let max_size = self.max_fragment_size();
        Ok(self.fragments.split(frame, max_size)?)
    }

    /// The order index the next ordered or sequenced payload on `channel` gets.
    pub fn next_order_index(&self, channel: u8) -> Option<u32> {
        self.order_indexes.get(channel as usize).copied()
    }

    pub fn mtu_size(&self) -> u16 {
        self.mtu_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_indexes_are_per_channel() {
        let mut queue = SendQueue::new(1400, 16);
        queue.insert(&[1], Reliability::ReliableOrd, 0).unwrap();
        queue.insert(&[1], Reliability::ReliableOrd, 0).unwrap();
        let frames = queue.insert(&[1], Reliability::ReliableSeq, 3).unwrap();
        assert_eq!(frames[0].order_index, Some(0));
        assert_eq!(frames[0].order_channel, Some(3));

        let frames = queue.insert(&[1], Reliability::Reliable, 0).unwrap();
        assert_eq!(frames[0].order_index, None);
        assert_eq!(queue.next_order_index(0), Some(2));
        assert_eq!(queue.next_order_index(3), Some(1));
    }

    #[test]
    fn splits_at_the_mtu() {
        let mut queue = SendQueue::new(100, 16);
        assert_eq!(queue.max_fragment_size(), 40);
        let frames = queue
            .insert(&[7u8; 100], Reliability::ReliableOrd, 1)
            .unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.order_index == Some(0)));
    }

    #[test]
    fn fragments_fit_the_length_field() {
        let mut queue = SendQueue::new(u16::MAX, 16);
        assert_eq!(queue.max_fragment_size(), MAX_FRAME_BODY);
        let frames = queue.insert(&[1u8; 9000], Reliability::Reliable, 0).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body.len(), MAX_FRAME_BODY);
    }

    #[test]
    fn rejects_without_consuming_an_index() {
        let mut queue = SendQueue::new(100, 2);
        assert_eq!(
            queue.insert(&[0u8; 81], Reliability::ReliableOrd, 0),
            Err(ConnectionError::PayloadTooLarge { size: 81, max: 80 })
        );
        assert_eq!(
            queue.insert(&[0u8; 1], Reliability::ReliableOrd, 32),
            Err(ConnectionError::InvalidChannel(32))
        );
        assert_eq!(queue.next_order_index(0), Some(0));
    }
}
