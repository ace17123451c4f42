//! Composite field primitives shared by packet serializers.

use crate::error::WireError;
use crate::varint::{ReadExt, WriteExt};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-component float vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vector2f {
    /// Create a vector
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Integer block coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPosition {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPosition {
    /// Create a position
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Field primitives used by every serializer in a packet table.
///
/// All methods have default implementations; a protocol version only needs
/// its own helper when one of these encodings changes.
pub trait PacketHelper: Send + Sync + fmt::Debug {
    /// Read a VarInt-length-prefixed byte array
    fn read_byte_array(&self, buf: &mut Bytes) -> Result<Bytes, WireError> {
        let len = buf.read_varuint32()? as usize;
        buf.read_bytes(len)
    }

    /// Write a VarInt-length-prefixed byte array
    fn write_byte_array(&self, buf: &mut BytesMut, value: &[u8]) {
        buf.put_varuint32(value.len() as u32);
        buf.put_slice(value);
    }

    /// Read a VarInt-length-prefixed UTF-8 string
    fn read_string(&self, buf: &mut Bytes) -> Result<String, WireError> {
        let bytes = self.read_byte_array(buf)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::Utf8)
    }

    /// Write a VarInt-length-prefixed UTF-8 string
    fn write_string(&self, buf: &mut BytesMut, value: &str) {
        self.write_byte_array(buf, value.as_bytes());
    }

    /// Read an i32 LE length-prefixed ASCII string
    fn read_le_ascii_string(&self, buf: &mut Bytes) -> Result<String, WireError> {
        let len = buf.read_i32_le()?;
        if len < 0 {
            return Err(WireError::Length(i64::from(len)));
        }
        let bytes = buf.read_bytes(len as usize)?;
        if !bytes.is_ascii() {
            return Err(WireError::Utf8);
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::Utf8)
    }

    /// Write an i32 LE length-prefixed ASCII string
    fn write_le_ascii_string(&self, buf: &mut BytesMut, value: &str) {
        buf.put_i32_le(value.len() as i32);
        buf.put_slice(value.as_bytes());
    }

    /// Read two LE floats
    fn read_vector2f(&self, buf: &mut Bytes) -> Result<Vector2f, WireError> {
        let x = buf.read_f32_le()?;
        let y = buf.read_f32_le()?;
        Ok(Vector2f { x, y })
    }

    /// Write two LE floats
    fn write_vector2f(&self, buf: &mut BytesMut, value: Vector2f) {
        buf.put_f32_le(value.x);
        buf.put_f32_le(value.y);
    }

    /// Read a block position (signed x, unsigned y, signed z)
    fn read_block_position(&self, buf: &mut Bytes) -> Result<BlockPosition, WireError> {
        let x = buf.read_varint32()?;
        let y = buf.read_varuint32()? as i32;
        let z = buf.read_varint32()?;
        Ok(BlockPosition { x, y, z })
    }

    /// Write a block position (signed x, unsigned y, signed z)
    fn write_block_position(&self, buf: &mut BytesMut, value: BlockPosition) {
        buf.put_varint32(value.x);
        buf.put_varuint32(value.y as u32);
        buf.put_varint32(value.z);
    }

    /// Read a VarInt-counted list of strings
    fn read_string_list(&self, buf: &mut Bytes) -> Result<Vec<String>, WireError> {
        let count = buf.read_varuint32()? as usize;
        // Each entry needs at least its length byte
        buf.ensure(count)?;
        (0..count).map(|_| self.read_string(buf)).collect()
    }

    /// Write a VarInt-counted list of strings
    fn write_string_list(&self, buf: &mut BytesMut, values: &[String]) {
        buf.put_varuint32(values.len() as u32);
        for value in values {
            self.write_string(buf, value);
        }
    }
}

/// Helper with the stock encodings
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPacketHelper;

impl PacketHelper for DefaultPacketHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_rejects_overlong_prefix() {
        let helper = DefaultPacketHelper;
        let mut buf = Bytes::from_static(&[0x05, b'a', b'b']);
        assert!(matches!(
            helper.read_string(&mut buf),
            Err(WireError::Incomplete { needed: 5, remaining: 2 })
        ));
    }

    #[test]
    fn test_le_ascii_string_rejects_negative_length() {
        let helper = DefaultPacketHelper;
        let mut buf = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(
            helper.read_le_ascii_string(&mut buf),
            Err(WireError::Length(-1))
        );
    }

    #[test]
    fn test_block_position_layout() {
        let helper = DefaultPacketHelper;
        let mut buf = BytesMut::new();
        helper.write_block_position(&mut buf, BlockPosition::new(-1, 64, 2));
        assert_eq!(&buf[..], &[0x01, 0x40, 0x04]);

        let mut bytes = buf.freeze();
        assert_eq!(
            helper.read_block_position(&mut bytes).unwrap(),
            BlockPosition::new(-1, 64, 2)
        );
    }

    #[test]
    fn test_string_list_guards_huge_count() {
        let helper = DefaultPacketHelper;
        let mut buf = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert!(helper.read_string_list(&mut buf).is_err());
    }
}
