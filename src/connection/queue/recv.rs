use std::collections::HashMap;

use crate::config::ReliabilityConfig;
use crate::connection::controller::window::ReliableWindow;
use crate::error::ProtocolError;
use crate::protocol::frame::Frame;
use crate::protocol::MAX_ORD_CHANS;
use crate::rakrs_debug;

use super::{FragmentQueue, OrderedQueue, SequencedQueue};

/// The inbound half of the encapsulation pipeline.
///
/// Frames coming out of the reliability engine are deduplicated by reliable
/// index, reassembled if they are fragments, and then released in channel
/// order. Payloads ready for the application pile up until [`flush`] is called.
///
/// [`flush`]: RecvQueue::flush
#[derive(Debug, Clone)]
pub struct RecvQueue {
    frag_queue: FragmentQueue,
    reliable_window: Option<ReliableWindow>,
    order_channels: HashMap<u8, OrderedQueue<Vec<u8>>>,
    sequence_channels: HashMap<u8, SequencedQueue>,
    half_window: u32,
    ready: Vec<Vec<u8>>,
}

impl RecvQueue {
    pub fn new(config: &ReliabilityConfig) -> Self {
        Self {
            frag_queue: FragmentQueue::new(config.max_split_count, config.max_pending_splits),
            reliable_window: if config.duplicate_detection {
                Some(ReliableWindow::new(config.window_size.max(1)))
            } else {
                None
            },
            order_channels: HashMap::new(),
            sequence_channels: HashMap::new(),
            half_window: config.half_window(),
            ready: Vec::new(),
        }
    }

    pub fn insert(&mut self, frame: Frame) -> Result<(), ProtocolError> {
        if let (Some(window), Some(index)) = (self.reliable_window.as_mut(), frame.reliable_index)
        {
            if !window.insert(index) {
                rakrs_debug!(true, "dropping duplicate reliable frame {}", index);
                return Ok(());
            }
        }

        let frame = match self.frag_queue.insert(frame)? {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let (channel, index) = match (frame.order_channel, frame.order_index) {
            (Some(channel), Some(index)) if frame.reliability.is_sequenced_or_ordered() => {
                (channel, index)
            }
            _ => {
                self.ready.push(frame.body);
                return Ok(());
            }
        };

        if channel >= MAX_ORD_CHANS {
            return Err(ProtocolError::InvalidChannel(channel));
        }

        if frame.reliability.is_sequenced() {
            let queue = self.sequence_channels.entry(channel).or_default();
            if queue.insert(index) {
                self.ready.push(frame.body);
            } else {
                rakrs_debug!(true, "dropping stale sequenced frame {} on channel {}", index, channel);
            }
            return Ok(());
        }

        let half_window = self.half_window;
        let queue = self
            .order_channels
            .entry(channel)
            .or_insert_with(|| OrderedQueue::new(half_window));

        if queue.insert(index, frame.body) {
            self.ready.extend(queue.flush());
        } else {
            rakrs_debug!(true, "dropping ordered frame {} on channel {}", index, channel);
        }
        Ok(())
    }

    /// Takes every payload ready for the application, in delivery order.
    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.ready)
    }

    /// Drops all buffered state.
    pub fn clear(&mut self) {
        self.frag_queue.clear();
        self.order_channels.clear();
        self.sequence_channels.clear();
        self.ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::FragmentMeta;
    use crate::protocol::reliability::Reliability;

    fn reliable(index: u32, body: &[u8]) -> Frame {
        let mut frame = Frame::new(Reliability::Reliable, Some(body));
        frame.reliable_index = Some(index);
        frame
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut queue = RecvQueue::new(&ReliabilityConfig::default());
        queue.insert(reliable(0, &[1])).unwrap();
        queue.insert(reliable(0, &[1])).unwrap();
        assert_eq!(queue.flush(), vec![vec![1]]);

        let mut queue = RecvQueue::new(&ReliabilityConfig::default().with_duplicate_detection(false));
        queue.insert(reliable(0, &[1])).unwrap();
        queue.insert(reliable(0, &[1])).unwrap();
        assert_eq!(queue.flush().len(), 2);
    }

    #[test]
    fn ordered_fragments() {
        let mut queue = RecvQueue::new(&ReliabilityConfig::default());
        let part = |index: u32, body: &[u8]| {
            Frame::new(Reliability::ReliableOrd, Some(body))
                .with_order(0, 1)
                .with_meta(FragmentMeta::new(2, 4, index))
        };
        queue
            .insert(Frame::new(Reliability::ReliableOrd, Some(&[9])).with_order(0, 0))
            .unwrap();
        queue.insert(part(1, &[3, 4])).unwrap();
        queue.insert(part(0, &[1, 2])).unwrap();
        assert_eq!(queue.flush(), vec![vec![9], vec![1, 2, 3, 4]]);
    }
}
