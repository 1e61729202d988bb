//! This module contains all the packets that are used by the RakNet protocol.
//! This module is split into two submodules:
//! - [`offline`]: Any packet that is not sent within a [`Frame`].
//! - [`online`]: Any packet considered to be online, which is sent within a [`Frame`].
//!
//! Connected peers exchange [`DatagramPacket`]s: frame datagrams, ACKs and NACKs.
//!
//! [`offline`]: crate::protocol::packet::offline
//! [`online`]: crate::protocol::packet::online
//! [`Frame`]: crate::protocol::frame::Frame
pub mod offline;
pub mod online;

use binary_util::interfaces::{Reader, Writer};
use binary_util::io::{ByteReader, ByteWriter};

use super::ack::{Ack, ACK, NACK};
use super::frame::FramePacket;
use super::invalid_data;

/// Everything a connected peer may send on the wire.
///
/// Decoding dispatches on the first byte, so handling a datagram is a single
/// exhaustive `match` over this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramPacket {
    Frames(FramePacket),
    Ack(Ack),
    Nack(Ack),
}

impl DatagramPacket {
    /// Decodes a full datagram, any bytes left over after the packet are an error.
    pub fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        let mut buf = ByteReader::from(bytes);
        let packet = Self::read(&mut buf)?;
        let left = buf.as_slice().len();
        if left > 0 {
            return invalid_data(format!("{} bytes left after decoding packet", left));
        }
        Ok(packet)
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.write_to_bytes()?.as_slice().to_vec())
    }
}

impl Reader<DatagramPacket> for DatagramPacket {
    fn read(buf: &mut ByteReader) -> std::io::Result<DatagramPacket> {
        match buf.as_slice().first() {
            Some(0x80..=0x8f) => Ok(DatagramPacket::Frames(FramePacket::read(buf)?)),
            Some(&ACK) => Ok(DatagramPacket::Ack(Ack::read(buf)?)),
            Some(&NACK) => Ok(DatagramPacket::Nack(Ack::read(buf)?)),
            Some(id) => invalid_data(format!("unknown datagram id {:#04x}", id)),
            None => invalid_data("empty datagram"),
        }
    }
}

impl Writer for DatagramPacket {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        match self {
            DatagramPacket::Frames(packet) => packet.write(buf),
            DatagramPacket::Ack(ack) | DatagramPacket::Nack(ack) => ack.write(buf),
        }
    }
}

impl From<FramePacket> for DatagramPacket {
    fn from(packet: FramePacket) -> Self {
        DatagramPacket::Frames(packet)
    }
}

impl From<Ack> for DatagramPacket {
    fn from(ack: Ack) -> Self {
        if ack.is_nack() {
            DatagramPacket::Nack(ack)
        } else {
            DatagramPacket::Ack(ack)
        }
    }
}

/// A utility macro that adds the conversions between a packet enum (such as
/// `OnlinePacket`) and every packet struct it wraps.
///
/// ```rust ignore
/// register_packets! {
///     Online is OnlinePacket,
///     ConnectedPing,
///     // etc...
/// }
/// ```
#[macro_export]
macro_rules! register_packets {
    ($name: ident is $kind: ident, $($packet: ident),*) => {
        $(
            impl From<$packet> for $kind {
                fn from(packet: $packet) -> Self {
                    $kind::$packet(packet)
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Frame;
    use crate::protocol::reliability::Reliability;

    #[test]
    fn dispatches_on_the_id() {
        let frames = FramePacket::new(3, vec![Frame::new(Reliability::Reliable, Some(&[1]))]);
        let bytes = DatagramPacket::from(frames.clone()).encode().unwrap();
        assert_eq!(DatagramPacket::decode(&bytes).unwrap(), DatagramPacket::Frames(frames));

        let nack = Ack::range(4, 9, true);
        let bytes = DatagramPacket::from(nack.clone()).encode().unwrap();
        assert_eq!(DatagramPacket::decode(&bytes).unwrap(), DatagramPacket::Nack(nack));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = DatagramPacket::from(Ack::single(1, false)).encode().unwrap();
        bytes.push(0);
        assert!(DatagramPacket::decode(&bytes).is_err());
        assert!(DatagramPacket::decode(&[0x42]).is_err());
        assert!(DatagramPacket::decode(&[]).is_err());
    }
}
