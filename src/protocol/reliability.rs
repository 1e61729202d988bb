/// The reliability class of a frame.
///
/// This decides whether the frame is tracked for retransmission (any `Reliable*`
/// class) and whether it takes part in channel ordering: ordered frames are
/// delivered strictly in order, sequenced frames are "latest wins" and stale
/// ones are dropped.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reliability {
    /// Unreliable (with no ack)
    Unreliable = 0,
    /// Unreliable with a sequence
    UnreliableSeq,
    /// Reliable
    Reliable,
    /// Reliably delivered **AND** ordered
    ReliableOrd,
    /// Reliably delivered and sequenced
    ReliableSeq,
}

impl Reliability {
    /// Reads the reliability from the flags of a frame header.
    /// The three "with ack receipt" classes are never sent over the wire,
    /// so they are rejected here.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 224) >> 5 {
            0 => Some(Reliability::Unreliable),
            1 => Some(Reliability::UnreliableSeq),
            2 => Some(Reliability::Reliable),
            3 => Some(Reliability::ReliableOrd),
            4 => Some(Reliability::ReliableSeq),
            _ => None,
        }
    }

    pub fn to_flags(&self) -> u8 {
        (*self as u8) << 5
    }

    /// Whether or not the packet is ordered.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::ReliableOrd)
    }

    /// Whether or not the packet is reliable.
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Reliable | Self::ReliableOrd | Self::ReliableSeq)
    }

    /// Whether or not the packet is unreliable.
    pub fn is_unreliable(&self) -> bool {
        !self.is_reliable()
    }

    /// Whether or not the packet is sequenced.
    pub fn is_sequenced(&self) -> bool {
        matches!(self, Self::UnreliableSeq | Self::ReliableSeq)
    }

    pub fn is_sequenced_or_ordered(&self) -> bool {
        self.is_sequenced() || self.is_ordered()
    }
}

impl Default for Reliability {
    fn default() -> Self {
        Reliability::ReliableOrd
    }
}
