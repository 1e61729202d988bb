//! Online packets travel inside frames once the offline handshake is done.
//!
//! The connection handles these itself, anything else a peer sends is handed
//! to the application:
//! - [`ConnectedPing`] / [`ConnectedPong`]
//! - [`ConnectionRequest`] / [`ConnectionAccept`]
//! - [`NewConnection`]
//! - [`Disconnect`] / [`LostConnection`]
use std::net::SocketAddr;

use crate::register_packets;

use binary_util::interfaces::{Reader, Writer};
use binary_util::io::{ByteReader, ByteWriter};
use binary_util::BinaryIo;

/// The most addresses a [`ConnectionAccept`] or [`NewConnection`] may list.
pub const MAX_SYSTEM_ADDRESSES: usize = 20;

#[derive(BinaryIo, Clone, Debug)]
#[repr(u8)]
pub enum OnlinePacket {
    ConnectedPing(ConnectedPing) = 0x00,
    ConnectedPong(ConnectedPong) = 0x03,
    LostConnection(LostConnection) = 0x04,
    ConnectionRequest(ConnectionRequest) = 0x09,
    ConnectionAccept(ConnectionAccept) = 0x10,
    NewConnection(NewConnection) = 0x13,
    Disconnect(Disconnect) = 0x15,
}

register_packets! {
    Online is OnlinePacket,
    ConnectedPing,
    ConnectedPong,
    LostConnection,
    ConnectionRequest,
    ConnectionAccept,
    NewConnection,
    Disconnect
}

impl OnlinePacket {
    /// Whether `id` is the first byte of a packet the connection consumes itself.
    pub fn is_control(id: u8) -> bool {
        matches!(id, 0x00 | 0x03 | 0x04 | 0x09 | 0x10 | 0x13 | 0x15)
    }
}

/// Keep-alive, the peer answers with a [`ConnectedPong`] echoing `time`.
#[derive(Clone, Debug, BinaryIo)]
pub struct ConnectedPing {
    pub time: i64,
}

#[derive(Clone, Debug, BinaryIo)]
pub struct ConnectedPong {
    /// The `time` of the ping being answered.
    pub ping_time: i64,
    pub pong_time: i64,
}

/// The first packet a peer sends over a fresh connection.
#[derive(Clone, Debug, BinaryIo)]
pub struct ConnectionRequest {
    pub client_id: i64,
    pub time: i64,
    pub security: bool,
}

/// The server's answer to a [`ConnectionRequest`].
#[derive(Clone, Debug)]
pub struct ConnectionAccept {
    pub client_address: SocketAddr,
    pub system_index: i16,
    pub internal_ids: Vec<SocketAddr>,
    /// The `time` of the request being answered.
    pub request_time: i64,
    pub timestamp: i64,
}

/// Reads addresses until only the two trailing timestamps remain.
fn read_addresses(buf: &mut ByteReader) -> std::io::Result<Vec<SocketAddr>> {
    let mut addresses = Vec::new();
    while addresses.len() < MAX_SYSTEM_ADDRESSES && buf.as_slice().len() > 16 {
        addresses.push(buf.read_type::<SocketAddr>()?);
    }
    Ok(addresses)
}

fn write_addresses(buf: &mut ByteWriter, addresses: &[SocketAddr]) -> std::io::Result<()> {
    if addresses.len() > MAX_SYSTEM_ADDRESSES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} system addresses, at most {} fit", addresses.len(), MAX_SYSTEM_ADDRESSES),
        ));
    }
    for address in addresses {
        buf.write_type::<SocketAddr>(address)?;
    }
    Ok(())
}

impl Reader<ConnectionAccept> for ConnectionAccept {
    fn read(buf: &mut ByteReader) -> std::io::Result<Self> {
        let client_address = buf.read_type::<SocketAddr>()?;
        let system_index = buf.read_i16()?;
        let internal_ids = read_addresses(buf)?;

        Ok(Self {
            client_address,
            system_index,
            internal_ids,
            request_time: buf.read_i64()?,
            timestamp: buf.read_i64()?,
        })
    }
}

impl Writer for ConnectionAccept {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        buf.write_type::<SocketAddr>(&self.client_address)?;
        buf.write_i16(self.system_index)?;
        write_addresses(buf, &self.internal_ids)?;
        buf.write_i64(self.request_time)?;
        buf.write_i64(self.timestamp)?;
        Ok(())
    }
}

/// Sent by the peer once it has processed the [`ConnectionAccept`].
#[derive(Clone, Debug)]
pub struct NewConnection {
    pub server_address: SocketAddr,
    pub system_address: Vec<SocketAddr>,
    pub request_time: i64,
    pub timestamp: i64,
}

impl Reader<NewConnection> for NewConnection {
    fn read(buf: &mut ByteReader) -> std::io::Result<Self> {
        let server_address = buf.read_type::<SocketAddr>()?;
        let system_address = read_addresses(buf)?;

        Ok(Self {
            server_address,
            system_address,
            request_time: buf.read_i64()?,
            timestamp: buf.read_i64()?,
        })
    }
}

impl Writer for NewConnection {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        buf.write_type::<SocketAddr>(&self.server_address)?;
        write_addresses(buf, &self.system_address)?;
        buf.write_i64(self.request_time)?;
        buf.write_i64(self.timestamp)?;
        Ok(())
    }
}

/// Either side is closing the connection.
#[derive(Clone, Debug, BinaryIo)]
pub struct Disconnect {}

#[derive(Clone, Debug, BinaryIo)]
pub struct LostConnection {}
