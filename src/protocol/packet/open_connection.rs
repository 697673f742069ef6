//! Handshake packets: the unconnected open-connection exchange and the
//! connect-request / server-handshake / client-handshake that follow it.

use std::net::SocketAddr;

use bytes::{Buf, BufMut};

use crate::protocol::{
    constants,
    packet::{DecodeError, Packet, RaknetEncodable},
    types::{EoBPadding, Magic, RaknetTime},
};

/// Bytes of a request-1 before its padding: id, magic, protocol version.
const REQUEST1_FIXED_SIZE: usize = 1 + 16 + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConnectionRequest1 {
    pub magic: Magic,
    pub protocol_version: u8,
    pub padding: EoBPadding,
}

impl OpenConnectionRequest1 {
    /// Builds a probe whose UDP datagram, headers included, is `mtu` bytes.
    pub fn for_mtu(magic: Magic, protocol_version: u8, mtu: u16) -> Self {
        let padding = (mtu as usize).saturating_sub(constants::UDP_HEADER_SIZE + REQUEST1_FIXED_SIZE);
        Self {
            magic,
            protocol_version,
            padding: EoBPadding(padding),
        }
    }

    /// The candidate MTU this probe advertises through its padding length.
    pub fn mtu(&self) -> u16 {
        let total = constants::UDP_HEADER_SIZE + REQUEST1_FIXED_SIZE + self.padding.0;
        total.min(u16::MAX as usize) as u16
    }
}

impl Packet for OpenConnectionRequest1 {
    const ID: u8 = 0x05;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.magic.encode_raknet(dst);
        self.protocol_version.encode_raknet(dst);
        self.padding.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            magic: Magic::decode_raknet(src)?,
            protocol_version: u8::decode_raknet(src)?,
            padding: EoBPadding::decode_raknet(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConnectionReply1 {
    pub magic: Magic,
    pub server_guid: u64,
    pub cookie: Option<u32>,
    pub mtu: u16,
}

impl Packet for OpenConnectionReply1 {
    const ID: u8 = 0x06;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.magic.encode_raknet(dst);
        self.server_guid.encode_raknet(dst);
        // security flag, followed by the cookie when set
        self.cookie.is_some().encode_raknet(dst);
        if let Some(cookie) = self.cookie {
            cookie.encode_raknet(dst);
        }
        self.mtu.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            magic: Magic::decode_raknet(src)?,
            server_guid: u64::decode_raknet(src)?,
            cookie: if bool::decode_raknet(src)? {
                Some(u32::decode_raknet(src)?)
            } else {
                None
            },
            mtu: u16::decode_raknet(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConnectionRequest2 {
    pub magic: Magic,
    pub server_addr: SocketAddr,
    pub mtu: u16,
    pub client_guid: u64,
}

impl Packet for OpenConnectionRequest2 {
    const ID: u8 = 0x07;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.magic.encode_raknet(dst);
        self.server_addr.encode_raknet(dst);
        self.mtu.encode_raknet(dst);
        self.client_guid.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            magic: Magic::decode_raknet(src)?,
            server_addr: SocketAddr::decode_raknet(src)?,
            mtu: u16::decode_raknet(src)?,
            client_guid: u64::decode_raknet(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConnectionReply2 {
    pub magic: Magic,
    pub server_guid: u64,
    pub client_addr: SocketAddr,
    pub mtu: u16,
    pub security: bool,
}

impl Packet for OpenConnectionReply2 {
    const ID: u8 = 0x08;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.magic.encode_raknet(dst);
        self.server_guid.encode_raknet(dst);
        self.client_addr.encode_raknet(dst);
        self.mtu.encode_raknet(dst);
        self.security.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            magic: Magic::decode_raknet(src)?,
            server_guid: u64::decode_raknet(src)?,
            client_addr: SocketAddr::decode_raknet(src)?,
            mtu: u16::decode_raknet(src)?,
            security: bool::decode_raknet(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleProtocolVersion {
    pub protocol: u8,
    pub magic: Magic,
    pub server_guid: u64,
}

impl Packet for IncompatibleProtocolVersion {
    const ID: u8 = 0x19;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.protocol.encode_raknet(dst);
        self.magic.encode_raknet(dst);
        self.server_guid.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol: u8::decode_raknet(src)?,
            magic: Magic::decode_raknet(src)?,
            server_guid: u64::decode_raknet(src)?,
        })
    }
}

/// Connect-request, sent reliably by the initiator once the open-connection
/// exchange completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub client_guid: u64,
    pub timestamp: RaknetTime,
    pub secure: bool,
}

impl Packet for ConnectionRequest {
    const ID: u8 = 0x09;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.client_guid.encode_raknet(dst);
        self.timestamp.encode_raknet(dst);
        self.secure.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            client_guid: u64::decode_raknet(src)?,
            timestamp: RaknetTime::decode_raknet(src)?,
            secure: bool::decode_raknet(src)?,
        })
    }
}

/// Server handshake: echoes the request timestamp next to the responder's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequestAccepted {
    pub client_addr: SocketAddr,
    pub system_index: u16,
    pub system_addresses: [SocketAddr; 10],
    pub request_timestamp: RaknetTime,
    pub accepted_timestamp: RaknetTime,
}

impl Packet for ConnectionRequestAccepted {
    const ID: u8 = 0x10;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.client_addr.encode_raknet(dst);
        self.system_index.encode_raknet(dst);
        for address in &self.system_addresses {
            address.encode_raknet(dst);
        }
        self.request_timestamp.encode_raknet(dst);
        self.accepted_timestamp.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let client_addr = SocketAddr::decode_raknet(src)?;
        let system_index = u16::decode_raknet(src)?;
        let system_addresses = decode_system_addresses(src)?;

        Ok(Self {
            client_addr,
            system_index,
            system_addresses,
            request_timestamp: RaknetTime::decode_raknet(src)?,
            accepted_timestamp: RaknetTime::decode_raknet(src)?,
        })
    }
}

/// Client handshake, the last step before both sides are connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncomingConnection {
    pub server_addr: SocketAddr,
    pub system_addresses: [SocketAddr; 10],
    pub request_timestamp: RaknetTime,
    pub accepted_timestamp: RaknetTime,
}

impl Packet for NewIncomingConnection {
    const ID: u8 = 0x13;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.server_addr.encode_raknet(dst);
        for address in &self.system_addresses {
            address.encode_raknet(dst);
        }
        self.request_timestamp.encode_raknet(dst);
        self.accepted_timestamp.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let server_addr = SocketAddr::decode_raknet(src)?;
        let system_addresses = decode_system_addresses(src)?;

        Ok(Self {
            server_addr,
            system_addresses,
            request_timestamp: RaknetTime::decode_raknet(src)?,
            accepted_timestamp: RaknetTime::decode_raknet(src)?,
        })
    }
}

fn decode_system_addresses(src: &mut impl Buf) -> Result<[SocketAddr; 10], DecodeError> {
    let mut addresses = constants::SYSTEM_ADDRESSES;
    for addr in &mut addresses {
        *addr = SocketAddr::decode_raknet(src)?;
    }
    Ok(addresses)
}
