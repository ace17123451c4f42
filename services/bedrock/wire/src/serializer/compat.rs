//! Serializers for the pre-negotiation table.
//!
//! Before the client's protocol is known the server can only read its login;
//! it never writes one.

use super::v422::read_login;
use super::PacketSerializer;
use crate::error::WireError;
use crate::helper::PacketHelper;
use crate::packet::LoginPacket;
use bytes::{Bytes, BytesMut};

/// Read-only login
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginSerializerCompat;

impl PacketSerializer<LoginPacket> for LoginSerializerCompat {
    fn serialize(
        &self,
        _buf: &mut BytesMut,
        _helper: &dyn PacketHelper,
        _packet: &LoginPacket,
    ) -> Result<(), WireError> {
        Err(WireError::Unsupported("compat login cannot be serialized"))
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut LoginPacket,
    ) -> Result<(), WireError> {
        read_login(buf, helper, packet)
    }
}
