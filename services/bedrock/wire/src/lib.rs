//! Packet tables, primitive codecs, versioned batch framing and status records for Bedrock.
//!
//! This crate provides the wire layer of the Bedrock game protocol: the
//! packet model, per-protocol-version packet tables that map numeric IDs to
//! field serializers, and the batch formats that frame and compress packets
//! into a single transport payload.
//!
//! ## Features
//!
//! - **Packet Tables**: Immutable ID ↔ type ↔ serializer maps, one per protocol version
//! - **Unknown Packets**: Unregistered IDs decode to a raw sentinel instead of failing
//! - **Batch Formats**: Transport versions 7 to 10 with zlib or raw deflate
//! - **Fault Isolation**: A corrupt frame drops only itself, never its siblings
//! - **Zero-Copy I/O**: Uses `Bytes`/`BytesMut` for frame slicing
//!
//! ## Wire Format
//!
//! ```text
//! +------+----------------------------------------------+-----------------+
//! | 0xFE | compressed batch                             | trailer (8B)    |
//! |      |   [varuint len][header][fields] ...          | only if encrypted|
//! +------+----------------------------------------------+-----------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod helper;
pub mod packet;
pub mod pong;
pub mod serializer;
pub mod tables;
pub mod varint;
pub mod wrapper;

// Re-export main types
pub use codec::{
    PacketCodec, PacketCodecBuilder, PacketDefinition, DEFAULT_TRANSPORT_PROTOCOL_VERSION,
    MAX_PACKET_ID,
};
pub use error::{BatchError, CodecBuildError, PacketSerializeError, WireError};
pub use helper::{BlockPosition, DefaultPacketHelper, PacketHelper, Vector2f};
pub use packet::{Packet, PacketBody, PacketHandler, PacketKind, PacketType, UnknownPacket};
pub use pong::BedrockPong;
pub use serializer::PacketSerializer;
pub use tables::{codec_for_protocol, compat_codec, supported_protocols, COMPAT_PROTOCOL_VERSION};
pub use varint::{ReadExt, WriteExt};
pub use wrapper::{
    wrapper_for_version, BatchSerializer, CompressionFormat, FrameHeader, WrapperSerializer,
    DEFAULT_COMPRESSION_LEVEL, MAX_DECOMPRESSED_SIZE,
};

/// Leading byte of every batch payload
pub const BATCH_MARKER: u8 = 0xFE;
