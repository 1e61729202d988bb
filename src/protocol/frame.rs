//! Frames (encapsulated packets) and the datagrams that carry them.
//!
//! A [`Frame`] is one application level unit with its own reliability and
//! ordering metadata, possibly one fragment of a larger payload. A
//! [`FramePacket`] is the transport level datagram: a 24-bit sequence id
//! followed by one or more frames.
use binary_util::interfaces::{Reader, Writer};
use binary_util::io::{ByteReader, ByteWriter};

use super::reliability::Reliability;
use super::{invalid_data, read_exact, read_u24_le, write_u24_le, MAX_FRAME_BODY, MAX_ORD_CHANS};

/// The flag set on a frame when it is a fragment of a split payload.
pub const FRAME_SPLIT_FLAG: u8 = 0x10;
/// The header byte written on every outgoing datagram.
pub const FRAME_PACKET_ID: u8 = 0x84;

/// The information for the given fragment.
/// This is used to determine how to reassemble the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentMeta {
    /// The total number of fragments in this frame.
    pub size: u32,
    /// The identifier for this fragment.
    /// Every fragment of the same payload shares this id.
    pub id: u16,
    /// The index of the fragment.
    /// This is the arrangement of the fragments in the frame.
    pub index: u32,
}

impl FragmentMeta {
    pub fn new(size: u32, id: u16, index: u32) -> Self {
        Self { size, id, index }
    }
}

/// An individual data frame, these are constructed from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The reliability of this frame.
    pub reliability: Reliability,
    /// The reliable message index of the frame (if reliable).
    /// This is stamped once by the reliability engine and survives resends.
    pub reliable_index: Option<u32>,
    /// The order index of the frame (if ordered or sequenced).
    /// For sequenced frames this is the "latest wins" sequence.
    pub order_index: Option<u32>,
    /// The order channel of the frame (if ordered or sequenced).
    pub order_channel: Option<u8>,
    /// The information for fragmentation (if the frame is split into parts)
    pub fragment_meta: Option<FragmentMeta>,
    /// The body of the frame, this is the payload of the frame.
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame carrying `body` with the given reliability.
    /// Ordering and fragment information is stamped later in the pipeline.
    pub fn new(reliability: Reliability, body: Option<&[u8]>) -> Self {
        Self {
            reliability,
            reliable_index: None,
            order_index: None,
            order_channel: None,
            fragment_meta: None,
            body: body.map(|b| b.to_vec()).unwrap_or_default(),
        }
    }

    /// Initializes a new empty frame that is Unreliable.
    pub fn init() -> Self {
        Self::new(Reliability::Unreliable, None)
    }

    pub fn with_meta(mut self, meta: FragmentMeta) -> Self {
        self.fragment_meta = Some(meta);
        self
    }

    pub fn with_order(mut self, channel: u8, index: u32) -> Self {
        self.order_channel = Some(channel);
        self.order_index = Some(index);
        self
    }

    /// Whether or not the frame is fragmented.
    pub fn is_fragmented(&self) -> bool {
        self.fragment_meta.is_some()
    }

    /// Whether or not the frame is sequenced.
    pub fn is_sequenced(&self) -> bool {
        self.reliability.is_sequenced()
    }

    /// The amount of bytes this frame occupies once written.
    pub fn byte_length(&self) -> usize {
        let mut len = 3 + self.body.len();
        if self.reliability.is_reliable() {
            len += 3;
        }
        if self.reliability.is_sequenced() {
            len += 3;
        }
        if self.reliability.is_sequenced_or_ordered() {
            len += 4;
        }
        if self.fragment_meta.is_some() {
            len += 10;
        }
        len
    }
}

impl Reader<Frame> for Frame {
    fn read(buf: &mut ByteReader) -> std::io::Result<Frame> {
        let flags = buf.read_u8()?;
        let reliability = match Reliability::from_flags(flags) {
            Some(r) => r,
            None => return invalid_data(format!("invalid reliability in flags {:#04x}", flags)),
        };

        // the length is sent in bits
        let size = (buf.read_u16()? as usize + 7) / 8;

        let mut frame = Frame::new(reliability, None);

        if reliability.is_reliable() {
            frame.reliable_index = Some(read_u24_le(buf)?);
        }

        // sequenced frames carry their "latest wins" index in the sequence field,
        // the order index that follows it is informational only.
        let sequence_index = if reliability.is_sequenced() {
            Some(read_u24_le(buf)?)
        } else {
            None
        };

        if reliability.is_sequenced_or_ordered() {
            let order_index = read_u24_le(buf)?;
            let channel = buf.read_u8()?;
            if channel >= MAX_ORD_CHANS {
                return invalid_data(format!("order channel {} out of range", channel));
            }
            frame.order_index = Some(sequence_index.unwrap_or(order_index));
            frame.order_channel = Some(channel);
        }

        if (flags & FRAME_SPLIT_FLAG) > 0 {
            frame.fragment_meta = Some(FragmentMeta {
                size: buf.read_u32()?,
                id: buf.read_u16()?,
                index: buf.read_u32()?,
            });
        }

        let mut body = vec![0u8; size];
        read_exact(buf, &mut body)?;
        frame.body = body;

        Ok(frame)
    }
}

impl Writer for Frame {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        let mut flags = self.reliability.to_flags();
        if self.fragment_meta.is_some() {
            flags |= FRAME_SPLIT_FLAG;
        }

        if self.body.len() > MAX_FRAME_BODY {
            return invalid_data(format!("frame body of {} bytes is too large", self.body.len()));
        }

        buf.write_u8(flags)?;
        buf.write_u16(self.body.len() as u16 * 8)?;

        if self.reliability.is_reliable() {
            write_u24_le(buf, self.reliable_index.unwrap_or(0))?;
        }

        if self.reliability.is_sequenced_or_ordered() {
            let order_index = self.order_index.unwrap_or(0);
            if self.reliability.is_sequenced() {
                write_u24_le(buf, order_index)?;
            }
            write_u24_le(buf, order_index)?;
            buf.write_u8(self.order_channel.unwrap_or(0))?;
        }

        if let Some(meta) = self.fragment_meta.as_ref() {
            buf.write_u32(meta.size)?;
            buf.write_u16(meta.id)?;
            buf.write_u32(meta.index)?;
        }

        buf.write(&self.body)?;
        Ok(())
    }
}

/// Frames are a encapsulation of a packet or packets.
/// They are used to send packets to the connection in a reliable way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    /// The sequence of this frame packet.
    /// We'll use this to respond with Ack and Nack to.
    /// This is sized check to 24 bits.
    pub sequence: u32,

    /// The frames for this frame packet, not to exceed the mtu size.
    pub frames: Vec<Frame>,
}

impl FramePacket {
    pub fn new(sequence: u32, frames: Vec<Frame>) -> Self {
        Self { sequence, frames }
    }

    /// Whether any frame in this datagram must be retransmitted when lost.
    pub fn is_reliable(&self) -> bool {
        self.frames.iter().any(|f| f.reliability.is_reliable())
    }

    /// The amount of bytes this datagram occupies once written.
    pub fn byte_length(&self) -> usize {
        4 + self.frames.iter().map(Frame::byte_length).sum::<usize>()
    }
}

impl Reader<FramePacket> for FramePacket {
    fn read(buf: &mut ByteReader) -> std::io::Result<FramePacket> {
        let id = buf.read_u8()?;
        if !(0x80..=0x8f).contains(&id) {
            return invalid_data(format!("{:#04x} is not a frame packet", id));
        }

        let sequence = read_u24_le(buf)?;
        let mut frames = Vec::new();

        while !buf.as_slice().is_empty() {
            frames.push(Frame::read(buf)?);
        }

        Ok(FramePacket { sequence, frames })
    }
}

impl Writer for FramePacket {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        buf.write_u8(FRAME_PACKET_ID)?;
        write_u24_le(buf, self.sequence)?;

        for frame in self.frames.iter() {
            frame.write(buf)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_split_frame_survives_the_wire() {
        let mut frame = Frame::new(Reliability::ReliableOrd, Some(&[1, 2, 3, 4]))
            .with_order(3, 0x00AB_CDEF)
            .with_meta(FragmentMeta::new(2, 7, 1));
        frame.reliable_index = Some(42);

        let packet = FramePacket::new(0x0012_3456, vec![frame.clone()]);
        let bytes = packet.write_to_bytes().unwrap();
        assert_eq!(bytes.as_slice().len(), packet.byte_length());

        let read = FramePacket::read_from_slice(bytes.as_slice()).unwrap();
        assert_eq!(read.sequence, 0x0012_3456);
        assert_eq!(read.frames, vec![frame]);
    }

    #[test]
    fn sequenced_index_travels_in_the_sequence_field() {
        let mut frame = Frame::new(Reliability::ReliableSeq, Some(&[9])).with_order(1, 77);
        frame.reliable_index = Some(3);
        let bytes = frame.write_to_bytes().unwrap();
        // flags, length, reliable index, sequence index
        assert_eq!(&bytes.as_slice()[6..9], &[77, 0, 0]);

        let read = Frame::read_from_slice(bytes.as_slice()).unwrap();
        assert_eq!(read.order_index, Some(77));
        assert_eq!(read.order_channel, Some(1));
    }

    #[test]
    fn rejects_truncated_body() {
        let frame = Frame::new(Reliability::Unreliable, Some(&[1, 2, 3, 4]));
        let bytes = frame.write_to_bytes().unwrap();
        let slice = bytes.as_slice();
        assert!(Frame::read_from_slice(&slice[..slice.len() - 1]).is_err());
    }

    #[test]
    fn rejects_bad_channel() {
        let frame = Frame::new(Reliability::ReliableOrd, Some(&[1])).with_order(40, 0);
        let bytes = frame.write_to_bytes().unwrap();
        assert!(Frame::read_from_slice(bytes.as_slice()).is_err());
    }
}
