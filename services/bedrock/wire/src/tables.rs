//! Packet tables shipped with the crate.
//!
//! | Protocol | Game version | Notes |
//! |----------|--------------|-------|
//! | 0        | 0.0.0        | compat table used before the client protocol is known |
//! | 422      | 1.16.200     | |
//! | 440      | 1.17.0       | 422 without `AddBehaviorTree` |

use crate::codec::PacketCodec;
use crate::error::CodecBuildError;
use crate::helper::DefaultPacketHelper;
use crate::packet::*;
use crate::serializer::compat::LoginSerializerCompat;
use crate::serializer::v422::*;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Protocol version of the compat table
pub const COMPAT_PROTOCOL_VERSION: u32 = 0;

/// Pre-negotiation table: login, status and disconnect only
pub fn compat() -> Result<PacketCodec, CodecBuildError> {
    PacketCodec::builder()
        .protocol_version(COMPAT_PROTOCOL_VERSION)
        .minecraft_version("0.0.0")
        .helper(Arc::new(DefaultPacketHelper))
        .register::<LoginPacket, _>(LoginSerializerCompat, 0x01)
        .register::<PlayStatusPacket, _>(PlayStatusSerializerV422, 0x02)
        .register::<DisconnectPacket, _>(DisconnectSerializerV422, 0x05)
        .build()
}

/// Protocol 422 (1.16.200)
pub fn v422() -> Result<PacketCodec, CodecBuildError> {
    PacketCodec::builder()
        .protocol_version(422)
        .minecraft_version("1.16.200")
        .helper(Arc::new(DefaultPacketHelper))
        .register::<LoginPacket, _>(LoginSerializerV422, 0x01)
        .register::<PlayStatusPacket, _>(PlayStatusSerializerV422, 0x02)
        .register::<ServerToClientHandshakePacket, _>(ServerToClientHandshakeSerializerV422, 0x03)
        .register::<ClientToServerHandshakePacket, _>(ClientToServerHandshakeSerializerV422, 0x04)
        .register::<DisconnectPacket, _>(DisconnectSerializerV422, 0x05)
        .register::<PlayerInputPacket, _>(PlayerInputSerializerV422, 0x39)
        .register::<SimpleEventPacket, _>(SimpleEventSerializerV422, 0x40)
        .register::<ShowStoreOfferPacket, _>(ShowStoreOfferSerializerV422, 0x46)
        .register::<ItemFrameDropItemPacket, _>(ItemFrameDropItemSerializerV422, 0x47)
        .register::<AddBehaviorTreePacket, _>(AddBehaviorTreeSerializerV422, 0x59)
        .register::<ModalFormRequestPacket, _>(ModalFormRequestSerializerV422, 0x64)
        .register::<UpdateSoftEnumPacket, _>(UpdateSoftEnumSerializerV422, 0x72)
        .register::<EmotePacket, _>(EmoteSerializerV422, 0x8a)
        .build()
}

/// Protocol 440 (1.17.0)
pub fn v440() -> Result<PacketCodec, CodecBuildError> {
    v422()?
        .to_builder()
        .protocol_version(440)
        .minecraft_version("1.17.0")
        .deregister::<AddBehaviorTreePacket>()
        .build()
}

static CODECS: Lazy<Result<BTreeMap<u32, Arc<PacketCodec>>, CodecBuildError>> = Lazy::new(|| {
    [compat(), v422(), v440()]
        .into_iter()
        .map(|built| built.map(|codec| (codec.protocol_version(), Arc::new(codec))))
        .collect()
});

/// Shared table for a protocol version, if one ships
pub fn codec_for_protocol(version: u32) -> Result<Option<Arc<PacketCodec>>, CodecBuildError> {
    match &*CODECS {
        Ok(codecs) => Ok(codecs.get(&version).cloned()),
        Err(e) => Err(e.clone()),
    }
}

/// Shared compat table
pub fn compat_codec() -> Result<Arc<PacketCodec>, CodecBuildError> {
    codec_for_protocol(COMPAT_PROTOCOL_VERSION)?.ok_or(CodecBuildError::NoPackets)
}

/// Protocol versions with a shipped table, ascending
pub fn supported_protocols() -> Vec<u32> {
    match &*CODECS {
        Ok(codecs) => codecs.keys().copied().collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PacketDefinition;
    use crate::helper::{BlockPosition, Vector2f};
    use bytes::{Bytes, BytesMut};

    /// Hand-assembled field bytes for every packet in the 422 table
    fn corpus() -> Vec<(u32, Vec<u8>)> {
        let mut login = vec![0x00, 0x00, 0x01, 0xa6, 0x0a];
        login.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, b'{', b'}']);
        login.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        vec![
            (0x01, login),
            (0x02, vec![0x00, 0x00, 0x00, 0x03]),
            (0x03, vec![0x03, b'j', b'w', b't']),
            (0x04, vec![]),
            (0x05, vec![0x00, 0x02, b'b', b'y']),
            (0x39, vec![0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xbf, 0x01, 0x00]),
            (0x40, vec![0x02, 0x00]),
            (0x46, vec![0x02, b'o', b'1', 0x01]),
            (0x47, vec![0x03, 0x40, 0x04]),
            (0x59, vec![0x02, b'{', b'}']),
            (0x64, vec![0xac, 0x02, 0x02, b'{', b'}']),
            (0x72, vec![0x01, b'e', 0x02, 0x01, b'a', 0x01, b'b', 0x02]),
            (0x8a, vec![0x2a, 0x01, b'w', 0x03]),
        ]
    }

    #[test]
    fn test_shipped_tables_build() {
        assert_eq!(supported_protocols(), vec![0, 422, 440]);
        let compat = compat_codec().unwrap();
        assert_eq!(compat.len(), 3);
        assert_eq!(compat.minecraft_version(), "0.0.0");
    }

    #[test]
    fn test_decode_encode_reproduces_bytes() {
        let codec = codec_for_protocol(422).unwrap().unwrap();
        let corpus = corpus();
        assert_eq!(corpus.len(), codec.len());

        for (id, bytes) in corpus {
            let mut buf = Bytes::from(bytes.clone());
            let packet = codec.decode(&mut buf, id).unwrap();
            assert!(buf.is_empty(), "id {:#x} left bytes", id);
            assert_eq!(codec.id_of(&packet).unwrap(), id);

            let mut out = BytesMut::new();
            codec.encode(&mut out, &packet).unwrap();
            assert_eq!(&out[..], &bytes[..], "id {:#x}", id);
        }
    }

    #[test]
    fn test_decoded_field_values() {
        let codec = codec_for_protocol(422).unwrap().unwrap();

        let mut buf = Bytes::from_static(&[0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xbf, 0x01, 0x00]);
        let packet = codec.decode(&mut buf, 0x39).unwrap();
        let input = packet.downcast_ref::<PlayerInputPacket>().unwrap();
        assert_eq!(input.input_motion, Vector2f::new(1.0, -0.5));
        assert!(input.jumping);
        assert!(!input.sneaking);

        let mut buf = Bytes::from_static(&[0x03, 0x40, 0x04]);
        let packet = codec.decode(&mut buf, 0x47).unwrap();
        assert_eq!(
            packet.downcast_ref::<ItemFrameDropItemPacket>().unwrap().block_position,
            BlockPosition::new(-2, 64, 2)
        );

        let mut buf = Bytes::from_static(&[0x01, b'e', 0x02, 0x01, b'a', 0x01, b'b', 0x02]);
        let packet = codec.decode(&mut buf, 0x72).unwrap();
        let update = packet.downcast_ref::<UpdateSoftEnumPacket>().unwrap();
        assert_eq!(update.soft_enum.values, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(update.update_type, SoftEnumUpdateType::Set);

        let mut buf = Bytes::from_static(&[0x2a, 0x01, b'w', 0x03]);
        let packet = codec.decode(&mut buf, 0x8a).unwrap();
        let emote = packet.downcast_ref::<EmotePacket>().unwrap();
        assert_eq!(emote.runtime_entity_id, 42);
        assert!(emote.flags.contains(EmoteFlags::SERVER_SIDE | EmoteFlags::MUTE_ANNOUNCEMENT));
    }

    #[test]
    fn test_compat_login_is_read_only() {
        let compat = compat_codec().unwrap();
        let (_, bytes) = corpus().remove(0);
        let mut buf = Bytes::from(bytes);

        let packet = compat.decode(&mut buf, 0x01).unwrap();
        let login = packet.downcast_ref::<LoginPacket>().unwrap();
        assert_eq!(login.protocol_version, 422);
        assert_eq!(login.chain_data, "{}");
        assert!(login.skin_data.is_empty());

        assert!(compat.encode(&mut BytesMut::new(), &packet).is_err());
    }

    #[test]
    fn test_v440_drops_behavior_tree() {
        let v440 = codec_for_protocol(440).unwrap().unwrap();
        assert!(v440.definition_of(0x59).is_none());
        assert_eq!(
            v440.definition_of(0x8a).map(PacketDefinition::kind),
            Some(PacketKind::Emote)
        );
        assert!(codec_for_protocol(999).unwrap().is_none());
    }
}
