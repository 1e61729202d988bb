//! Offline packets are exchanged before a connection exists. They cover server
//! discovery (ping/pong) and the two round trips that negotiate the MTU of the
//! connection:
//! - [`UnconnectedPing`] / [`UnconnectedPong`]
//! - [`OpenConnectRequest`] / [`OpenConnectReply`]
//! - [`SessionInfoRequest`] / [`SessionInfoReply`]
//! - [`IncompatibleProtocolVersion`]
use std::net::SocketAddr;

use crate::protocol::Magic;
use crate::protocol::RAKNET_HEADER_FRAME_OVERHEAD;
use crate::register_packets;

use binary_util::interfaces::{Reader, Writer};
use binary_util::io::{ByteReader, ByteWriter};
use binary_util::BinaryIo;

/// Every offline packet, keyed by its id byte.
#[derive(Clone, Debug, BinaryIo)]
#[repr(u8)]
pub enum OfflinePacket {
    UnconnectedPing(UnconnectedPing) = 0x01,
    UnconnectedPong(UnconnectedPong) = 0x1c,
    OpenConnectRequest(OpenConnectRequest) = 0x05,
    OpenConnectReply(OpenConnectReply) = 0x06,
    SessionInfoRequest(SessionInfoRequest) = 0x07,
    SessionInfoReply(SessionInfoReply) = 0x08,
    IncompatibleProtocolVersion(IncompatibleProtocolVersion) = 0x19,
}

register_packets! {
    Offline is OfflinePacket,
    UnconnectedPing,
    UnconnectedPong,
    OpenConnectRequest,
    OpenConnectReply,
    SessionInfoRequest,
    SessionInfoReply,
    IncompatibleProtocolVersion
}

/// Server discovery request, answered with an [`UnconnectedPong`].
#[derive(Debug, Clone, BinaryIo)]
pub struct UnconnectedPing {
    pub timestamp: u64,
    pub magic: Magic,
    pub client_id: i64,
}

#[derive(Debug, Clone, BinaryIo)]
pub struct UnconnectedPong {
    pub timestamp: u64,
    pub server_id: u64,
    pub magic: Magic,
}

/// The first MTU probe ("Open Connection Request 1").
///
/// The packet is padded with zeroes up to the MTU the peer wants to use, so the
/// MTU is recovered from the size of the datagram rather than from a field.
#[derive(Debug, Clone)]
pub struct OpenConnectRequest {
    pub protocol: u8,
    pub mtu_size: u16,
}

/// id byte + magic + protocol byte
const OPEN_CONNECT_REQUEST_HEADER: u16 = 1 + 16 + 1;

impl Reader<OpenConnectRequest> for OpenConnectRequest {
    fn read(buf: &mut ByteReader) -> Result<OpenConnectRequest, std::io::Error> {
        // the id byte has already been consumed
        let len = buf.as_slice().len() + 1;
        buf.read_type::<Magic>()?;
        let protocol = buf.read_u8()?;

        let mut padding = vec![0u8; buf.as_slice().len()];
        buf.read(&mut padding)?;

        Ok(OpenConnectRequest {
            protocol,
            mtu_size: (len + RAKNET_HEADER_FRAME_OVERHEAD as usize).min(u16::MAX as usize) as u16,
        })
    }
}

impl Writer for OpenConnectRequest {
    fn write(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_type::<Magic>(&Magic::new())?;
        buf.write_u8(self.protocol)?;
        let padding = self
            .mtu_size
            .saturating_sub(RAKNET_HEADER_FRAME_OVERHEAD + OPEN_CONNECT_REQUEST_HEADER);
        buf.write(&vec![0u8; padding as usize])?;
        Ok(())
    }
}

/// "Open Connection Reply 1", echoes the MTU the server is willing to use.
#[derive(Debug, Clone, BinaryIo)]
pub struct OpenConnectReply {
    pub magic: Magic,
    pub server_id: u64,
    pub security: bool,
    pub mtu_size: u16,
}

/// "Open Connection Request 2", the peer confirms the MTU and its client id.
#[derive(Debug, Clone, BinaryIo)]
pub struct SessionInfoRequest {
    pub magic: Magic,
    /// The address of the server, as seen by the peer.
    pub address: SocketAddr,
    pub mtu_size: u16,
    pub client_id: i64,
}

/// "Open Connection Reply 2", after this the peer is expected to speak in frames.
#[derive(Debug, Clone, BinaryIo)]
pub struct SessionInfoReply {
    pub magic: Magic,
    pub server_id: u64,
    pub client_address: SocketAddr,
    pub mtu_size: u16,
    pub security: bool,
}

/// Sent when the peer speaks a RakNet protocol version this server does not.
#[derive(Debug, Clone, BinaryIo)]
pub struct IncompatibleProtocolVersion {
    pub protocol: u8,
    pub magic: Magic,
    pub server_id: u64,
}
