//! VarInt and fixed-width primitive codec.
//!
//! Checked readers over any [`Buf`] and matching writers over any [`BufMut`].
//! Unsigned VarInts are little-endian base-128; signed VarInts are ZigZag
//! encoded first.

use crate::error::WireError;
use bytes::{Buf, BufMut, Bytes};

/// Maximum encoded width of a 32-bit VarInt
pub const MAX_VARINT32_LEN: usize = 5;
/// Maximum encoded width of a 64-bit VarInt
pub const MAX_VARINT64_LEN: usize = 10;

/// Checked primitive reads
pub trait ReadExt: Buf {
    /// Fail unless `needed` bytes remain
    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(WireError::Incomplete { needed, remaining });
        }
        Ok(())
    }

    /// Read one byte
    fn read_u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.get_u8())
    }

    /// Read a boolean byte (any non-zero value is true)
    fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian i16
    fn read_i16_le(&mut self) -> Result<i16, WireError> {
        self.ensure(2)?;
        Ok(self.get_i16_le())
    }

    /// Read a big-endian i32
    fn read_i32_be(&mut self) -> Result<i32, WireError> {
        self.ensure(4)?;
        Ok(self.get_i32())
    }

    /// Read a little-endian i32
    fn read_i32_le(&mut self) -> Result<i32, WireError> {
        self.ensure(4)?;
        Ok(self.get_i32_le())
    }

    /// Read a little-endian f32
    fn read_f32_le(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        Ok(self.get_f32_le())
    }

    /// Read an unsigned 32-bit VarInt
    fn read_varuint32(&mut self) -> Result<u32, WireError> {
        let mut value = 0u32;
        for i in 0..MAX_VARINT32_LEN {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarIntOverflow)
    }

    /// Read a ZigZag-encoded signed 32-bit VarInt
    fn read_varint32(&mut self) -> Result<i32, WireError> {
        let raw = self.read_varuint32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    /// Read an unsigned 64-bit VarInt
    fn read_varuint64(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT64_LEN {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarIntOverflow)
    }

    /// Read a ZigZag-encoded signed 64-bit VarInt
    fn read_varint64(&mut self) -> Result<i64, WireError> {
        let raw = self.read_varuint64()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Read exactly `len` bytes
    fn read_bytes(&mut self, len: usize) -> Result<Bytes, WireError> {
        self.ensure(len)?;
        Ok(self.copy_to_bytes(len))
    }
}

impl<B: Buf + ?Sized> ReadExt for B {}

/// Primitive writes
pub trait WriteExt: BufMut {
    /// Write a boolean byte
    fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    /// Write an unsigned 32-bit VarInt
    fn put_varuint32(&mut self, mut value: u32) {
        while value & !0x7f != 0 {
            self.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    /// Write a ZigZag-encoded signed 32-bit VarInt
    fn put_varint32(&mut self, value: i32) {
        self.put_varuint32(((value << 1) ^ (value >> 31)) as u32);
    }

    /// Write an unsigned 64-bit VarInt
    fn put_varuint64(&mut self, mut value: u64) {
        while value & !0x7f != 0 {
            self.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    /// Write a ZigZag-encoded signed 64-bit VarInt
    fn put_varint64(&mut self, value: i64) {
        self.put_varuint64(((value << 1) ^ (value >> 63)) as u64);
    }
}

impl<B: BufMut + ?Sized> WriteExt for B {}
