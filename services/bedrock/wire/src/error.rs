//! Wire protocol error types.

use thiserror::Error;

/// Leaf decode/encode errors raised by the primitive codec and field serializers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before a field was complete
    #[error("short buffer: needed {needed} bytes, {remaining} remaining")]
    Incomplete {
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// VarInt ran past its maximum width
    #[error("varint too long")]
    VarIntOverflow,

    /// Length prefix is negative or out of range
    #[error("invalid length: {0}")]
    Length(i64),

    /// String bytes were not valid UTF-8
    #[error("invalid utf-8 string")]
    Utf8,

    /// Enumerated field carried an unknown tag
    #[error("invalid {kind} value: {value}")]
    InvalidEnum {
        /// Name of the enumeration
        kind: &'static str,
        /// Tag that was read
        value: i64,
    },

    /// Packet type is not registered in the active packet table
    #[error("packet {0} is not registered")]
    Unregistered(&'static str),

    /// Serializer does not support this direction
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Failure to encode or decode a single packet
///
/// Carries the packet ID and type name so callers can log and skip the
/// offending packet without aborting its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error whilst {direction} {packet} (id {id}): {source}")]
pub struct PacketSerializeError {
    /// Numeric packet ID
    pub id: u32,
    /// Packet type name
    pub packet: &'static str,
    /// "serializing" or "deserializing"
    pub direction: &'static str,
    /// Underlying cause
    #[source]
    pub source: WireError,
}

impl PacketSerializeError {
    /// Wrap a decode failure
    pub fn decoding(id: u32, packet: &'static str, source: WireError) -> Self {
        Self {
            id,
            packet,
            direction: "deserializing",
            source,
        }
    }

    /// Wrap an encode failure
    pub fn encoding(id: u32, packet: &'static str, source: WireError) -> Self {
        Self {
            id,
            packet,
            direction: "serializing",
            source,
        }
    }
}

/// Malformed batch errors; the whole batch is discarded
#[derive(Error, Debug)]
pub enum BatchError {
    /// Frame length prefix exceeds the bytes left in the batch
    #[error("frame length {declared} exceeds remaining {remaining} bytes")]
    FrameOverrun {
        /// Length the frame declared
        declared: usize,
        /// Bytes left after the prefix
        remaining: usize,
    },

    /// Zero-length frame
    #[error("packet cannot be empty")]
    EmptyFrame,

    /// Decompressed payload is larger than the ceiling
    #[error("decompressed payload exceeds {0} bytes")]
    TooLarge(usize),

    /// Frame length prefix could not be read
    #[error("bad frame prefix: {0}")]
    Prefix(#[from] WireError),

    /// Compression or decompression failure
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),
}

/// Packet table construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecBuildError {
    /// Same packet type registered twice
    #[error("packet {0} is already registered")]
    DuplicatePacket(&'static str),

    /// Two packet types share one ID
    #[error("packet id {id} is shared by {first} and {second}")]
    DuplicateId {
        /// Conflicting ID
        id: u32,
        /// First type registered with the ID
        first: &'static str,
        /// Second type registered with the ID
        second: &'static str,
    },

    /// Packet ID does not fit the frame header
    #[error("packet id {id} of {packet} exceeds the 10-bit id space")]
    IdOutOfRange {
        /// Offending ID
        id: u32,
        /// Packet type registered with the ID
        packet: &'static str,
    },

    /// No packets were registered
    #[error("must have at least one packet registered")]
    NoPackets,

    /// Protocol version was not set
    #[error("protocol version is not set")]
    MissingProtocolVersion,

    /// Minecraft version was not set
    #[error("minecraft version is not set")]
    MissingMinecraftVersion,

    /// Minecraft version has fewer than three components
    #[error("invalid minecraft version: {0}")]
    InvalidMinecraftVersion(String),

    /// Packet helper was not set
    #[error("packet helper is not set")]
    MissingHelper,
}
