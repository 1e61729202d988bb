//! The RakNet wire protocol: sequence space arithmetic, frames, datagrams,
//! acknowledgements and the offline/online control packets.
pub mod ack;
pub mod frame;
pub(crate) mod magic;
pub mod packet;
pub mod reliability;
pub mod u24;

pub use magic::*;

use binary_util::io::{ByteReader, ByteWriter};
use byteorder::{ByteOrder, LittleEndian};

/// The maximum amount of fragments a single payload may be split into.
pub const MAX_FRAGS: u32 = 1024;
/// The amount of independent ordering channels.
pub const MAX_ORD_CHANS: u8 = 32;
/// IP header (20 bytes) + UDP header (8 bytes).
pub const RAKNET_HEADER_FRAME_OVERHEAD: u16 = 28;
/// Bytes of every datagram reserved for the UDP/IP, datagram and frame headers
/// when deciding how large a fragment body may be.
pub const RAKNET_FRAGMENT_OVERHEAD: u16 = 60;
/// The largest frame body the wire can describe, the length field is a `u16`
/// counting bits.
pub const MAX_FRAME_BODY: usize = (u16::MAX / 8) as usize;

/// Reads a little endian `u24`.
pub(crate) fn read_u24_le(buf: &mut ByteReader) -> std::io::Result<u32> {
    let mut bytes = [0u8; 3];
    read_exact(buf, &mut bytes)?;
    Ok(LittleEndian::read_u24(&bytes))
}

/// Writes a little endian `u24`, the value is masked into the 24-bit space.
pub(crate) fn write_u24_le(buf: &mut ByteWriter, value: u32) -> std::io::Result<()> {
    let mut bytes = [0u8; 3];
    LittleEndian::write_u24(&mut bytes, u24::wrap(value));
    buf.write(&bytes)?;
    Ok(())
}

/// Fills `out` from the reader, failing instead of reading short.
pub(crate) fn read_exact(buf: &mut ByteReader, out: &mut [u8]) -> std::io::Result<()> {
    if buf.as_slice().len() < out.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "expected {} bytes, only {} remaining",
                out.len(),
                buf.as_slice().len()
            ),
        ));
    }
    buf.read(out)?;
    Ok(())
}

pub(crate) fn invalid_data<T>(msg: impl Into<String>) -> std::io::Result<T> {
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        msg.into(),
    ))
}
