/// INTERNAL
/// Generates the RaknetPacket enum type used by the session to
/// encode and decode control packets. Payloads whose id is not a
/// registered control packet are surfaced as `UserData`.
macro_rules! define_raknet_packets {
    (
        $(
            $name:ident,
        )+
    ) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum RaknetPacket {
            $(
                $name($name),
            )+
            UserData { id: u8, payload: bytes::Bytes },
        }

        impl RaknetPacket {
            pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
                if !src.has_remaining() {
                    return Err(DecodeError::UnexpectedEof);
                }
                let id = src.get_u8();
                Ok(match id {
                    $(
                        <$name as Packet>::ID => {
                            RaknetPacket::$name(<$name as Packet>::decode_body(src)?)
                        }
                    )+
                    other => {
                        let payload = src.copy_to_bytes(src.remaining());
                        RaknetPacket::UserData { id: other, payload }
                    }
                })
            }

            pub fn id(&self) -> u8 {
                match self {
                    $(
                        RaknetPacket::$name(_inner) => <$name as Packet>::ID,
                    )+
                    RaknetPacket::UserData { id, .. } => *id,
                }
            }

            pub fn encode(&self, dst: &mut impl BufMut) {
                dst.put_u8(self.id());
                match self {
                    $(
                        RaknetPacket::$name(inner) => inner.encode_body(dst),
                    )+
                    RaknetPacket::UserData { payload, .. } => dst.put_slice(payload),
                }
            }
        }

        $(
            impl From<$name> for RaknetPacket {
                fn from(pkt: $name) -> Self {
                    RaknetPacket::$name(pkt)
                }
            }
        )+
    }
}
pub(crate) use define_raknet_packets;
