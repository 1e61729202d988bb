use thiserror::Error;

/// A violation of the reliability protocol.
///
/// These are never retried or recovered from, the connection that produced one
/// moves to `Closing` and all of its state is released.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ack record runs backwards ({start} to {end})")]
    MalformedRange { start: u32, end: u32 },

    #[error("ack record spans {span} ids, at most {max} are allowed")]
    AckRangeTooLarge { span: u32, max: u32 },

    #[error("ack covers {total} ids, at most {max} are allowed")]
    AckTooLarge { total: u32, max: u32 },

    #[error("{pending} datagrams are unacknowledged, at most {max} may be in flight")]
    UnackedOverflow { pending: usize, max: u32 },

    #[error("payload split into {count} fragments, at most {max} are allowed")]
    TooManySplits { count: u32, max: u32 },

    #[error("more than {max} split payloads are being reassembled")]
    TooManyPendingSplits { max: usize },

    #[error("fragment {index} is out of bounds for a payload of {count} fragments")]
    FragmentIndexOutOfBounds { index: u32, count: u32 },

    #[error("order channel {0} is out of range")]
    InvalidChannel(u8),
}
