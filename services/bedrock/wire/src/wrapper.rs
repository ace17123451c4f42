//! Versioned batch framing.
//!
//! A batch is every packet of one flush, framed and compressed into a single
//! transport payload:
//!
//! ```text
//! compress(
//!   +----------------+--------------+-------------+
//!   | varuint length | frame header | packet body |  repeated
//!   +----------------+--------------+-------------+
//! )
//! ```
//!
//! | Transport version | Frame header                                  | Compression |
//! |-------------------|-----------------------------------------------|-------------|
//! | 7                 | `u8 id`                                       | zlib        |
//! | 8                 | `u8 id`, `u8 sender`, `u8 target`             | zlib        |
//! | 9                 | varuint `id \| sender << 10 \| target << 12`  | zlib        |
//! | 10                | as 9                                          | raw deflate |

use crate::codec::PacketCodec;
use crate::error::{BatchError, PacketSerializeError, WireError};
use crate::packet::Packet;
use crate::varint::{ReadExt, WriteExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use std::fmt;
use std::io::{Read, Write};
use tracing::{debug, error};

/// Ceiling on decompressed batch size (2 MiB)
pub const MAX_DECOMPRESSED_SIZE: usize = 2 * 1024 * 1024;

/// Default zlib compression level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const PACKED_ID_MASK: u32 = 0x3ff;
const PACKED_SENDER_SHIFT: u32 = 10;
const PACKED_TARGET_SHIFT: u32 = 12;
const SUB_CLIENT_MASK: u32 = 0x03;

/// Converts between ordered packets and one compressed batch payload
pub trait WrapperSerializer: Send + Sync + fmt::Debug {
    /// Transport protocol version this format belongs to
    fn version(&self) -> u8;

    /// Frame, encode and compress `packets`.
    ///
    /// Packets that fail to encode are logged and left out.
    fn serialize(
        &self,
        codec: &PacketCodec,
        packets: &[Packet],
        level: u32,
    ) -> Result<Bytes, BatchError>;

    /// Decompress and split a batch.
    ///
    /// Frames that fail to decode are logged and skipped; structural errors
    /// discard the whole batch.
    fn deserialize(&self, codec: &PacketCodec, compressed: &[u8])
        -> Result<Vec<Packet>, BatchError>;
}

/// Layout of the per-frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// Single ID byte
    Id,
    /// ID byte followed by sender and target sub-client bytes
    IdWithSubClients,
    /// One varuint packing ID and sub-client IDs
    Packed,
}

/// Compression applied to the framed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// zlib stream with header and checksum
    Zlib,
    /// Raw deflate stream
    Deflate,
}

/// Batch format for one transport protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSerializer {
    version: u8,
    header: FrameHeader,
    compression: CompressionFormat,
}

/// Transport protocol 7
pub static WRAPPER_V7: BatchSerializer =
    BatchSerializer::new(7, FrameHeader::Id, CompressionFormat::Zlib);
/// Transport protocol 8
pub static WRAPPER_V8: BatchSerializer =
    BatchSerializer::new(8, FrameHeader::IdWithSubClients, CompressionFormat::Zlib);
/// Transport protocol 9
pub static WRAPPER_V9: BatchSerializer =
    BatchSerializer::new(9, FrameHeader::Packed, CompressionFormat::Zlib);
/// Transport protocol 10
pub static WRAPPER_V10: BatchSerializer =
    BatchSerializer::new(10, FrameHeader::Packed, CompressionFormat::Deflate);

/// Format for a negotiated transport version; unmapped versions get the
/// lowest supported format
pub fn wrapper_for_version(version: u8) -> &'static BatchSerializer {
    match version {
        8 => &WRAPPER_V8,
        9 => &WRAPPER_V9,
        10 => &WRAPPER_V10,
        _ => &WRAPPER_V7,
    }
}

impl BatchSerializer {
    /// Describe a batch format
    pub const fn new(version: u8, header: FrameHeader, compression: CompressionFormat) -> Self {
        Self {
            version,
            header,
            compression,
        }
    }

    /// Frame header layout
    pub fn header(&self) -> FrameHeader {
        self.header
    }

    /// Compression format
    pub fn compression(&self) -> CompressionFormat {
        self.compression
    }

    fn write_header(&self, buf: &mut BytesMut, id: u32, packet: &Packet) -> Result<(), WireError> {
        match self.header {
            FrameHeader::Id | FrameHeader::IdWithSubClients => {
                let id = u8::try_from(id).map_err(|_| WireError::Length(i64::from(id)))?;
                buf.put_u8(id);
                if self.header == FrameHeader::IdWithSubClients {
                    buf.put_u8(packet.sender_sub_client_id);
                    buf.put_u8(packet.target_sub_client_id);
                }
            }
            FrameHeader::Packed => {
                if id > PACKED_ID_MASK {
                    return Err(WireError::Length(i64::from(id)));
                }
                let sender = u32::from(packet.sender_sub_client_id) & SUB_CLIENT_MASK;
                let target = u32::from(packet.target_sub_client_id) & SUB_CLIENT_MASK;
                buf.put_varuint32(
                    id | sender << PACKED_SENDER_SHIFT | target << PACKED_TARGET_SHIFT,
                );
            }
        }
        Ok(())
    }

    fn read_header(&self, buf: &mut Bytes) -> Result<(u32, u8, u8), WireError> {
        match self.header {
            FrameHeader::Id => Ok((u32::from(buf.read_u8()?), 0, 0)),
            FrameHeader::IdWithSubClients => {
                let id = buf.read_u8()?;
                let sender = buf.read_u8()?;
                let target = buf.read_u8()?;
                Ok((u32::from(id), sender, target))
            }
            FrameHeader::Packed => {
                let header = buf.read_varuint32()?;
                Ok((
                    header & PACKED_ID_MASK,
                    ((header >> PACKED_SENDER_SHIFT) & SUB_CLIENT_MASK) as u8,
                    ((header >> PACKED_TARGET_SHIFT) & SUB_CLIENT_MASK) as u8,
                ))
            }
        }
    }

    fn decode_frame(&self, codec: &PacketCodec, frame: &mut Bytes) -> Result<Packet, PacketSerializeError> {
        let (id, sender, target) = self
            .read_header(frame)
            .map_err(|e| PacketSerializeError::decoding(0, "frame header", e))?;
        let packet = codec.decode(frame, id)?;
        Ok(packet.with_sub_clients(sender, target))
    }

    fn compress(&self, raw: &[u8], level: u32) -> Result<Vec<u8>, BatchError> {
        let level = flate2::Compression::new(level.min(9));
        let compressed = match self.compression {
            CompressionFormat::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), level);
                encoder.write_all(raw)?;
                encoder.finish()?
            }
            CompressionFormat::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::with_capacity(raw.len() / 2), level);
                encoder.write_all(raw)?;
                encoder.finish()?
            }
        };
        Ok(compressed)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, BatchError> {
        // Read one byte past the ceiling to detect overflow
        let limit = MAX_DECOMPRESSED_SIZE as u64 + 1;
        let mut out = Vec::new();
        match self.compression {
            CompressionFormat::Zlib => ZlibDecoder::new(compressed).take(limit).read_to_end(&mut out)?,
            CompressionFormat::Deflate => {
                DeflateDecoder::new(compressed).take(limit).read_to_end(&mut out)?
            }
        };
        if out.len() > MAX_DECOMPRESSED_SIZE {
            return Err(BatchError::TooLarge(MAX_DECOMPRESSED_SIZE));
        }
        Ok(out)
    }
}

impl WrapperSerializer for BatchSerializer {
    fn version(&self) -> u8 {
        self.version
    }

    fn serialize(
        &self,
        codec: &PacketCodec,
        packets: &[Packet],
        level: u32,
    ) -> Result<Bytes, BatchError> {
        let mut batch = BytesMut::new();
        let mut frame = BytesMut::new();

        for packet in packets {
            frame.clear();

            let id = match codec.id_of(packet) {
                Ok(id) => id,
                Err(e) => {
                    error!("Error serializing {}: {}", packet.kind().name(), e);
                    continue;
                }
            };
            if let Err(e) = self.write_header(&mut frame, id, packet) {
                error!("Error serializing {} header: {}", packet.kind().name(), e);
                continue;
            }
            if let Err(e) = codec.encode(&mut frame, packet) {
                error!("{}", e);
                continue;
            }

            batch.put_varuint32(frame.len() as u32);
            batch.put_slice(&frame);
        }

        Ok(Bytes::from(self.compress(&batch, level)?))
    }

    fn deserialize(
        &self,
        codec: &PacketCodec,
        compressed: &[u8],
    ) -> Result<Vec<Packet>, BatchError> {
        let mut batch = Bytes::from(self.decompress(compressed)?);
        let mut packets = Vec::new();

        while batch.has_remaining() {
            let declared = batch.read_varuint32()? as usize;
            if declared == 0 {
                return Err(BatchError::EmptyFrame);
            }
            if declared > batch.remaining() {
                return Err(BatchError::FrameOverrun {
                    declared,
                    remaining: batch.remaining(),
                });
            }

            let mut frame = batch.split_to(declared);
            match self.decode_frame(codec, &mut frame) {
                Ok(packet) => packets.push(packet),
                Err(e) => debug!("Dropping packet in batch: {}", e),
            }
        }

        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{
        DisconnectPacket, EmoteFlags, EmotePacket, ModalFormRequestPacket, PacketBody,
        PlayStatus, PlayStatusPacket,
    };
    use crate::tables::codec_for_protocol;
    use std::sync::Arc;

    fn codec() -> Arc<PacketCodec> {
        codec_for_protocol(422).unwrap().unwrap()
    }

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::from(PlayStatusPacket::new(PlayStatus::PlayerSpawn)),
            Packet::from(ModalFormRequestPacket {
                form_id: 9,
                form_data: "{\"type\":\"form\"}".to_string(),
            })
            .with_sub_clients(1, 2),
            Packet::from(EmotePacket {
                runtime_entity_id: 300,
                emote_id: "wave".to_string(),
                flags: EmoteFlags::SERVER_SIDE,
            }),
        ]
    }

    #[test]
    fn test_every_format_preserves_order_and_fields() {
        let codec = codec();
        for wrapper in [&WRAPPER_V8, &WRAPPER_V9, &WRAPPER_V10] {
            let payload = wrapper
                .serialize(&codec, &sample_packets(), DEFAULT_COMPRESSION_LEVEL)
                .unwrap();
            let decoded = wrapper.deserialize(&codec, &payload).unwrap();
            assert_eq!(decoded, sample_packets(), "version {}", wrapper.version());
        }
    }

    #[test]
    fn test_v7_drops_sub_client_ids() {
        let codec = codec();
        let payload = WRAPPER_V7
            .serialize(&codec, &sample_packets(), DEFAULT_COMPRESSION_LEVEL)
            .unwrap();
        let decoded = WRAPPER_V7.deserialize(&codec, &payload).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].sender_sub_client_id, 0);
        assert_eq!(decoded[1].body, sample_packets()[1].body);
    }

    #[test]
    fn test_packed_header_layout() {
        let codec = codec();
        let packet = Packet::from(DisconnectPacket::hidden()).with_sub_clients(3, 1);
        let payload = WRAPPER_V9.serialize(&codec, &[packet], 0).unwrap();

        let mut raw = Vec::new();
        ZlibDecoder::new(&payload[..]).read_to_end(&mut raw).unwrap();
        // length 3, header 0x05 | 3 << 10 | 1 << 12 = 0x1c05, skipped flag
        assert_eq!(raw, vec![0x03, 0x85, 0x38, 0x01]);
    }

    #[test]
    fn test_corrupt_frame_is_isolated() {
        let codec = codec();
        let mut raw = Vec::new();
        // valid PlayStatus
        raw.extend_from_slice(&[0x05, 0x02, 0x00, 0x00, 0x00, 0x03]);
        // Disconnect whose string length overruns its own frame
        raw.extend_from_slice(&[0x04, 0x05, 0x00, 0x09, b'x']);
        // valid Disconnect
        raw.extend_from_slice(&[0x02, 0x05, 0x01]);

        let packets = WRAPPER_V7.deserialize(&codec, &zlib(&raw)).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].kind(), crate::PacketKind::PlayStatus);
        assert_eq!(
            packets[1].body,
            PacketBody::Disconnect(DisconnectPacket::hidden())
        );
    }

    #[test]
    fn test_frame_overrun_aborts_batch() {
        let codec = codec();
        let mut raw = Vec::new();
        raw.extend_from_slice(&[0x05, 0x02, 0x00, 0x00, 0x00, 0x03]);
        raw.extend_from_slice(&[0x20, 0x05, 0x01]);

        let result = WRAPPER_V7.deserialize(&codec, &zlib(&raw));
        assert!(matches!(
            result,
            Err(BatchError::FrameOverrun {
                declared: 32,
                remaining: 2
            })
        ));
    }

    #[test]
    fn test_empty_frame_aborts_batch() {
        let codec = codec();
        let result = WRAPPER_V7.deserialize(&codec, &zlib(&[0x00]));
        assert!(matches!(result, Err(BatchError::EmptyFrame)));
    }

    #[test]
    fn test_decompression_ceiling() {
        let codec = codec();
        let oversized = vec![0u8; MAX_DECOMPRESSED_SIZE + 1];
        let result = WRAPPER_V7.deserialize(&codec, &zlib(&oversized));
        assert!(matches!(result, Err(BatchError::TooLarge(_))));
    }

    #[test]
    fn test_unknown_packet_passes_through() {
        let codec = codec();
        let raw = [0x04, 0x7f, 0xaa, 0xbb, 0xcc];
        let packets = WRAPPER_V7.deserialize(&codec, &zlib(&raw)).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(codec.id_of(&packets[0]).unwrap(), 0x7f);

        let payload = WRAPPER_V7.serialize(&codec, &packets, 6).unwrap();
        let mut reencoded = Vec::new();
        ZlibDecoder::new(&payload[..]).read_to_end(&mut reencoded).unwrap();
        assert_eq!(reencoded, raw.to_vec());
    }

    #[test]
    fn test_unregistered_packet_is_left_out() {
        let compat = crate::tables::compat_codec().unwrap();
        let packets = vec![
            Packet::from(EmotePacket::default()),
            Packet::from(DisconnectPacket::with_message("bye")),
        ];
        let payload = WRAPPER_V9.serialize(&compat, &packets, 6).unwrap();
        let decoded = WRAPPER_V9.deserialize(&compat, &payload).unwrap();
        assert_eq!(decoded, vec![Packet::from(DisconnectPacket::with_message("bye"))]);
    }

    #[test]
    fn test_unmapped_version_falls_back_to_lowest() {
        assert_eq!(wrapper_for_version(11).version(), 7);
        assert_eq!(wrapper_for_version(10).compression(), CompressionFormat::Deflate);
        assert_eq!(wrapper_for_version(8).header(), FrameHeader::IdWithSubClients);
    }
}
