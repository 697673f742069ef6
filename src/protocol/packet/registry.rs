use bytes::{Buf, BufMut, Bytes};

use crate::protocol::cursor::Cursor;
use crate::protocol::packet::{
    ConnectedPing, ConnectedPong, ConnectionRequest, ConnectionRequestAccepted, DecodeError,
    DisconnectionNotification, IncompatibleProtocolVersion, NewIncomingConnection,
    OpenConnectionReply1, OpenConnectionReply2, OpenConnectionRequest1, OpenConnectionRequest2,
    Packet, utils::define_raknet_packets,
};

define_raknet_packets! {
    ConnectedPing,
    ConnectedPong,
    OpenConnectionRequest1,
    OpenConnectionReply1,
    OpenConnectionRequest2,
    OpenConnectionReply2,
    ConnectionRequest,
    ConnectionRequestAccepted,
    NewIncomingConnection,
    DisconnectionNotification,
    IncompatibleProtocolVersion,
}

impl RaknetPacket {
    /// Encodes id byte and body into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut cursor = Cursor::new();
        self.encode(cursor.writer());
        cursor.freeze()
    }

    pub fn is_user_data(&self) -> bool {
        matches!(self, RaknetPacket::UserData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::RaknetTime;

    #[test]
    fn control_packets_roundtrip_through_registry() {
        let pkt = RaknetPacket::from(ConnectedPong {
            ping_time: RaknetTime(5),
            pong_time: RaknetTime(9),
        });
        let mut bytes = pkt.to_bytes();
        assert_eq!(bytes[0], 0x03);
        assert_eq!(RaknetPacket::decode(&mut bytes).unwrap(), pkt);
    }

    #[test]
    fn unregistered_ids_are_user_data() {
        let mut bytes = Bytes::from_static(&[0xFE, 1, 2, 3]);
        let pkt = RaknetPacket::decode(&mut bytes).unwrap();
        assert!(pkt.is_user_data());
        assert_eq!(pkt.id(), 0xFE);
        assert_eq!(pkt.to_bytes(), Bytes::from_static(&[0xFE, 1, 2, 3]));
    }

    #[test]
    fn empty_payload_is_eof() {
        let mut bytes = Bytes::new();
        assert_eq!(RaknetPacket::decode(&mut bytes), Err(DecodeError::UnexpectedEof));
    }
}
