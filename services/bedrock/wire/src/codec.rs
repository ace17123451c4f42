//! Versioned packet tables.
//!
//! A [`PacketCodec`] maps numeric packet IDs to packet types and their field
//! serializers for one protocol version. Tables are assembled with
//! [`PacketCodecBuilder`] and are immutable once built.

use crate::error::{CodecBuildError, PacketSerializeError, WireError};
use crate::helper::PacketHelper;
use crate::packet::{Packet, PacketBody, PacketKind, PacketType, UnknownPacket};
use crate::serializer::{BodySerializer, PacketSerializer, Typed};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Transport protocol version assumed when a table does not set one
pub const DEFAULT_TRANSPORT_PROTOCOL_VERSION: u8 = 10;

/// Highest packet ID that fits the 10-bit frame header
pub const MAX_PACKET_ID: u32 = 0x3ff;

fn factory<T: PacketType>() -> PacketBody {
    T::default().into()
}

/// One registered packet type
#[derive(Clone)]
pub struct PacketDefinition {
    id: u32,
    kind: PacketKind,
    factory: fn() -> PacketBody,
    serializer: Arc<dyn BodySerializer>,
}

impl PacketDefinition {
    /// Numeric packet ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Packet type
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Fresh default-valued body of this type
    pub fn create(&self) -> PacketBody {
        (self.factory)()
    }
}

impl fmt::Debug for PacketDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketDefinition")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Immutable packet table for one protocol version
#[derive(Clone)]
pub struct PacketCodec {
    protocol_version: u32,
    transport_protocol_version: u8,
    minecraft_version: String,
    helper: Arc<dyn PacketHelper>,
    by_id: Vec<Option<PacketDefinition>>,
    by_kind: HashMap<PacketKind, PacketDefinition>,
}

impl PacketCodec {
    /// Start an empty table
    pub fn builder() -> PacketCodecBuilder {
        PacketCodecBuilder::new()
    }

    /// Game protocol version
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Transport protocol version this table expects
    pub fn transport_protocol_version(&self) -> u8 {
        self.transport_protocol_version
    }

    /// Game version string, e.g. `1.16.200`
    pub fn minecraft_version(&self) -> &str {
        &self.minecraft_version
    }

    /// Field primitives used by this table
    pub fn helper(&self) -> &dyn PacketHelper {
        self.helper.as_ref()
    }

    /// Definition registered under `id`
    pub fn definition_of(&self, id: u32) -> Option<&PacketDefinition> {
        self.by_id.get(id as usize).and_then(Option::as_ref)
    }

    /// Definition registered for a packet type
    pub fn definition_for(&self, kind: PacketKind) -> Option<&PacketDefinition> {
        self.by_kind.get(&kind)
    }

    /// Whether a packet can be encoded with this table
    pub fn is_registered(&self, packet: &Packet) -> bool {
        self.id_of(packet).is_ok()
    }

    /// Number of registered packet types
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether the table is empty (never true for a built table)
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Numeric ID of a packet
    pub fn id_of(&self, packet: &Packet) -> Result<u32, WireError> {
        match &packet.body {
            PacketBody::Unknown(unknown) => Ok(unknown.id),
            body => self
                .by_kind
                .get(&body.kind())
                .map(PacketDefinition::id)
                .ok_or(WireError::Unregistered(body.kind().name())),
        }
    }

    /// Decode the fields of packet `id` from `buf`.
    ///
    /// Unregistered IDs yield an [`UnknownPacket`] holding the remaining
    /// bytes.
    pub fn decode(&self, buf: &mut Bytes, id: u32) -> Result<Packet, PacketSerializeError> {
        let Some(definition) = self.definition_of(id) else {
            let payload = buf.split_to(buf.len());
            return Ok(Packet::from(UnknownPacket { id, payload }));
        };

        let mut body = definition.create();
        definition
            .serializer
            .deserialize(buf, self.helper(), &mut body)
            .map_err(|e| PacketSerializeError::decoding(id, definition.kind.name(), e))?;

        if buf.has_remaining() {
            debug!(
                "Packet {} (id {}) has {} unread bytes",
                definition.kind.name(),
                id,
                buf.remaining()
            );
        }

        Ok(Packet::new(body))
    }

    /// Encode the fields of `packet` into `buf`
    pub fn encode(&self, buf: &mut BytesMut, packet: &Packet) -> Result<(), PacketSerializeError> {
        if let PacketBody::Unknown(unknown) = &packet.body {
            buf.put_slice(&unknown.payload);
            return Ok(());
        }

        let kind = packet.kind();
        let definition = self.by_kind.get(&kind).ok_or_else(|| {
            PacketSerializeError::encoding(0, kind.name(), WireError::Unregistered(kind.name()))
        })?;

        definition
            .serializer
            .serialize(buf, self.helper(), &packet.body)
            .map_err(|e| PacketSerializeError::encoding(definition.id, kind.name(), e))
    }

    /// Builder seeded with this table, for deriving a newer version
    pub fn to_builder(&self) -> PacketCodecBuilder {
        let mut packets: Vec<PacketDefinition> = self.by_kind.values().cloned().collect();
        packets.sort_by_key(PacketDefinition::id);

        PacketCodecBuilder {
            protocol_version: Some(self.protocol_version),
            transport_protocol_version: self.transport_protocol_version,
            minecraft_version: Some(self.minecraft_version.clone()),
            helper: Some(Arc::clone(&self.helper)),
            packets,
            error: None,
        }
    }
}

impl fmt::Debug for PacketCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCodec")
            .field("protocol_version", &self.protocol_version)
            .field("transport_protocol_version", &self.transport_protocol_version)
            .field("minecraft_version", &self.minecraft_version)
            .field("packets", &self.by_kind.len())
            .finish()
    }
}

/// Accumulates registrations and metadata for a [`PacketCodec`].
///
/// Registration errors are held until [`build`](Self::build).
#[derive(Clone)]
pub struct PacketCodecBuilder {
    protocol_version: Option<u32>,
    transport_protocol_version: u8,
    minecraft_version: Option<String>,
    helper: Option<Arc<dyn PacketHelper>>,
    packets: Vec<PacketDefinition>,
    error: Option<CodecBuildError>,
}

impl PacketCodecBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            protocol_version: None,
            transport_protocol_version: DEFAULT_TRANSPORT_PROTOCOL_VERSION,
            minecraft_version: None,
            helper: None,
            packets: Vec::new(),
            error: None,
        }
    }

    /// Register packet type `T` under `id`
    pub fn register<T, S>(mut self, serializer: S, id: u32) -> Self
    where
        T: PacketType,
        S: PacketSerializer<T> + 'static,
    {
        if self.packets.iter().any(|p| p.kind == T::KIND) {
            self.error
                .get_or_insert(CodecBuildError::DuplicatePacket(T::KIND.name()));
            return self;
        }

        self.packets.push(PacketDefinition {
            id,
            kind: T::KIND,
            factory: factory::<T>,
            serializer: Arc::new(Typed::<T, S>::new(serializer)),
        });
        self
    }

    /// Remove packet type `T`
    pub fn deregister<T: PacketType>(mut self) -> Self {
        self.packets.retain(|p| p.kind != T::KIND);
        self
    }

    /// Set the game protocol version
    pub fn protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = Some(version);
        self
    }

    /// Set the transport protocol version
    pub fn transport_protocol_version(mut self, version: u8) -> Self {
        self.transport_protocol_version = version;
        self
    }

    /// Set the game version string
    pub fn minecraft_version(mut self, version: impl Into<String>) -> Self {
        self.minecraft_version = Some(version.into());
        self
    }

    /// Set the field primitives
    pub fn helper(mut self, helper: Arc<dyn PacketHelper>) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Validate and freeze the table
    pub fn build(self) -> Result<PacketCodec, CodecBuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.packets.is_empty() {
            return Err(CodecBuildError::NoPackets);
        }
        let protocol_version = self
            .protocol_version
            .ok_or(CodecBuildError::MissingProtocolVersion)?;
        let minecraft_version = self
            .minecraft_version
            .ok_or(CodecBuildError::MissingMinecraftVersion)?;
        if minecraft_version.split('.').count() < 3 {
            return Err(CodecBuildError::InvalidMinecraftVersion(minecraft_version));
        }
        let helper = self.helper.ok_or(CodecBuildError::MissingHelper)?;

        if let Some(definition) = self.packets.iter().find(|p| p.id > MAX_PACKET_ID) {
            return Err(CodecBuildError::IdOutOfRange {
                id: definition.id,
                packet: definition.kind.name(),
            });
        }

        let max_id = self.packets.iter().map(|p| p.id).max().unwrap_or(0) as usize;
        let mut by_id: Vec<Option<PacketDefinition>> = vec![None; max_id + 1];
        let mut by_kind = HashMap::with_capacity(self.packets.len());

        for definition in self.packets {
            let slot = &mut by_id[definition.id as usize];
            if let Some(existing) = slot {
                return Err(CodecBuildError::DuplicateId {
                    id: definition.id,
                    first: existing.kind.name(),
                    second: definition.kind.name(),
                });
            }
            *slot = Some(definition.clone());
            by_kind.insert(definition.kind, definition);
        }

        Ok(PacketCodec {
            protocol_version,
            transport_protocol_version: self.transport_protocol_version,
            minecraft_version,
            helper,
            by_id,
            by_kind,
        })
    }
}

impl Default for PacketCodecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::DefaultPacketHelper;
    use crate::packet::{DisconnectPacket, ModalFormRequestPacket, PlayStatusPacket};
    use crate::serializer::v422::{
        DisconnectSerializerV422, ModalFormRequestSerializerV422, PlayStatusSerializerV422,
    };

    fn small_builder() -> PacketCodecBuilder {
        PacketCodec::builder()
            .protocol_version(422)
            .minecraft_version("1.16.200")
            .helper(Arc::new(DefaultPacketHelper))
            .register::<PlayStatusPacket, _>(PlayStatusSerializerV422, 0x02)
            .register::<DisconnectPacket, _>(DisconnectSerializerV422, 0x05)
    }

    #[test]
    fn test_build_and_lookup() {
        let codec = small_builder().build().unwrap();

        assert_eq!(codec.protocol_version(), 422);
        assert_eq!(
            codec.transport_protocol_version(),
            DEFAULT_TRANSPORT_PROTOCOL_VERSION
        );
        assert_eq!(codec.len(), 2);
        assert_eq!(codec.definition_of(0x05).unwrap().kind(), PacketKind::Disconnect);
        assert!(codec.definition_of(0x03).is_none());
        assert!(codec.definition_of(0x400).is_none());
        assert_eq!(
            codec.id_of(&Packet::from(DisconnectPacket::hidden())).unwrap(),
            0x05
        );
    }

    #[test]
    fn test_unregistered_packet_has_no_id() {
        let codec = small_builder().build().unwrap();
        let packet = Packet::from(ModalFormRequestPacket::default());

        assert_eq!(
            codec.id_of(&packet),
            Err(WireError::Unregistered("ModalFormRequestPacket"))
        );
        assert!(codec.encode(&mut BytesMut::new(), &packet).is_err());
    }

    #[test]
    fn test_unknown_id_decodes_to_sentinel() {
        let codec = small_builder().build().unwrap();
        let mut buf = Bytes::from_static(&[0xde, 0xad]);

        let packet = codec.decode(&mut buf, 0x99).unwrap();
        let PacketBody::Unknown(unknown) = &packet.body else {
            panic!("expected unknown packet, got {:?}", packet);
        };
        assert_eq!(unknown.id, 0x99);
        assert_eq!(&unknown.payload[..], &[0xde, 0xad]);

        let mut out = BytesMut::new();
        codec.encode(&mut out, &packet).unwrap();
        assert_eq!(&out[..], &[0xde, 0xad]);
        assert_eq!(codec.id_of(&packet).unwrap(), 0x99);
    }

    #[test]
    fn test_decode_failure_names_packet() {
        let codec = small_builder().build().unwrap();
        let mut buf = Bytes::from_static(&[0x00, 0x00, 0x00, 0x09]);

        let err = codec.decode(&mut buf, 0x02).unwrap_err();
        assert_eq!(err.id, 0x02);
        assert_eq!(err.packet, "PlayStatusPacket");
        assert!(matches!(err.source, WireError::InvalidEnum { value: 9, .. }));
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = small_builder()
            .register::<DisconnectPacket, _>(DisconnectSerializerV422, 0x06)
            .build()
            .unwrap_err();
        assert_eq!(err, CodecBuildError::DuplicatePacket("DisconnectPacket"));

        let err = small_builder()
            .register::<ModalFormRequestPacket, _>(ModalFormRequestSerializerV422, 0x05)
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecBuildError::DuplicateId { id: 0x05, .. }));
    }

    #[test]
    fn test_builder_rejects_oversized_id() {
        let err = small_builder()
            .register::<ModalFormRequestPacket, _>(ModalFormRequestSerializerV422, u32::MAX)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CodecBuildError::IdOutOfRange {
                id: u32::MAX,
                packet: "ModalFormRequestPacket",
            }
        );

        let codec = small_builder()
            .register::<ModalFormRequestPacket, _>(ModalFormRequestSerializerV422, MAX_PACKET_ID)
            .build()
            .unwrap();
        assert_eq!(
            codec.definition_of(MAX_PACKET_ID).unwrap().kind(),
            PacketKind::ModalFormRequest
        );
    }

    #[test]
    fn test_builder_requires_metadata() {
        assert_eq!(
            PacketCodec::builder()
                .protocol_version(1)
                .minecraft_version("1.0.0")
                .helper(Arc::new(DefaultPacketHelper))
                .build()
                .unwrap_err(),
            CodecBuildError::NoPackets
        );
        assert_eq!(
            small_builder().minecraft_version("1.16").build().unwrap_err(),
            CodecBuildError::InvalidMinecraftVersion("1.16".to_string())
        );

        let no_helper = PacketCodec::builder()
            .protocol_version(1)
            .minecraft_version("1.0.0")
            .register::<DisconnectPacket, _>(DisconnectSerializerV422, 0x05)
            .build();
        assert_eq!(no_helper.unwrap_err(), CodecBuildError::MissingHelper);
    }

    #[test]
    fn test_to_builder_and_deregister() {
        let codec = small_builder().build().unwrap();
        let derived = codec
            .to_builder()
            .protocol_version(440)
            .minecraft_version("1.17.0")
            .deregister::<PlayStatusPacket>()
            .build()
            .unwrap();

        assert_eq!(derived.protocol_version(), 440);
        assert_eq!(derived.len(), 1);
        assert!(derived.definition_for(PacketKind::PlayStatus).is_none());
        assert_eq!(codec.len(), 2);
    }
}
