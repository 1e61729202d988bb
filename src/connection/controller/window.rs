use std::collections::HashSet;

use crate::protocol::u24;

/// What the receive window made of an incoming datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Newer than anything seen so far. `missing` is the inclusive range of
    /// ids skipped over, which should be NACKed.
    Fresh { missing: Option<(u32, u32)> },
    /// At or behind the newest id, but still inside the window.
    Stale,
    /// Too far from the newest id in either direction to be current.
    OutOfWindow,
}

/// Tracks the newest datagram sequence id received from the peer.
#[derive(Debug, Clone)]
pub struct ReceiveWindow {
    last: u32,
    half_window: u32,
    /// The widest gap a single NACK is allowed to cover.
    max_nack: u32,
}

impl ReceiveWindow {
    pub fn new(half_window: u32, max_nack: u32) -> Self {
        Self {
            // datagram 0 must count as newer
            last: u24::MAX,
            half_window,
            max_nack,
        }
    }

    /// Records `sequence` as received.
    ///
    /// Gaps wider than the NACK bound only report the newest ids of the gap,
    /// anything older is left to the peer's resend timer.
    pub fn insert(&mut self, sequence: u32) -> Arrival {
        let diff = u24::minus_wrap(sequence, self.last);

        if diff.unsigned_abs() >= self.half_window {
            return Arrival::OutOfWindow;
        }

        if diff <= 0 {
            return Arrival::Stale;
        }

        let gap = (diff - 1) as u32;
        let missing = if gap > 0 && self.max_nack > 0 {
            let width = gap.min(self.max_nack);
            Some((u24::minus(sequence, width), u24::minus(sequence, 1)))
        } else {
            None
        };

        self.last = sequence;
        Arrival::Fresh { missing }
    }

    /// The newest sequence id received.
    pub fn last(&self) -> u32 {
        self.last
    }

    pub(crate) fn set_last(&mut self, last: u32) {
        self.last = u24::wrap(last);
    }
}

/// Remembers which reliable message indexes have been received, so a frame
/// delivered twice (resent after a lost ACK) is only handed up once.
#[derive(Debug, Clone)]
pub struct ReliableWindow {
    /// Every index before this one has been received.
    start: u32,
    /// Indexes received ahead of `start`.
    received: HashSet<u32>,
    size: u32,
}

impl ReliableWindow {
    pub fn new(size: u32) -> Self {
        Self {
            start: 0,
            received: HashSet::new(),
            size,
        }
    }

    /// Returns `false` if `index` was already received or is too far ahead
    /// of the oldest missing index.
    pub fn insert(&mut self, index: u32) -> bool {
        let distance = u24::minus_wrap(index, self.start);
        if distance < 0 || distance as u32 >= self.size {
            return false;
        }

        if !self.received.insert(index) {
            return false;
        }

        self.adjust();
        true
    }

    /// Slides the window past every index received in a row.
    fn adjust(&mut self) {
        while self.received.remove(&self.start) {
            self.start = u24::plus_one(self.start);
        }
    }

    /// The oldest index not received yet.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Amount of indexes received out of order.
    pub fn pending(&self) -> usize {
        self.received.len()
    }
}
