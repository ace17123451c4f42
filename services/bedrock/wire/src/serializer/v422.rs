//! Serializers introduced with protocol 422 (1.16.200).

use super::PacketSerializer;
use crate::error::WireError;
use crate::helper::PacketHelper;
use crate::packet::{
    AddBehaviorTreePacket, ClientToServerHandshakePacket, DisconnectPacket, EmoteFlags,
    EmotePacket, ItemFrameDropItemPacket, LoginPacket, ModalFormRequestPacket, PlayStatus,
    PlayStatusPacket, PlayerInputPacket, ServerToClientHandshakePacket, ShowStoreOfferPacket,
    SimpleEventPacket, SimpleEventType, SoftEnumUpdateType, UpdateSoftEnumPacket,
};
use crate::varint::{ReadExt, WriteExt};
use bytes::{BufMut, Bytes, BytesMut};

/// Reads the login blob shared by every login serializer
pub(crate) fn read_login(
    buf: &mut Bytes,
    helper: &dyn PacketHelper,
    packet: &mut LoginPacket,
) -> Result<(), WireError> {
    packet.protocol_version = buf.read_i32_be()?;
    let mut blob = helper.read_byte_array(buf)?;
    packet.chain_data = helper.read_le_ascii_string(&mut blob)?;
    packet.skin_data = helper.read_le_ascii_string(&mut blob)?;
    Ok(())
}

/// Login
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginSerializerV422;

impl PacketSerializer<LoginPacket> for LoginSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &LoginPacket,
    ) -> Result<(), WireError> {
        buf.put_i32(packet.protocol_version);
        let mut blob = BytesMut::with_capacity(8 + packet.chain_data.len() + packet.skin_data.len());
        helper.write_le_ascii_string(&mut blob, &packet.chain_data);
        helper.write_le_ascii_string(&mut blob, &packet.skin_data);
        helper.write_byte_array(buf, &blob);
        Ok(())
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

/// Play status
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayStatusSerializerV422;

impl PacketSerializer<PlayStatusPacket> for PlayStatusSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        _helper: &dyn PacketHelper,
        packet: &PlayStatusPacket,
    ) -> Result<(), WireError> {
        buf.put_i32(packet.status as i32);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        _helper: &dyn PacketHelper,
        packet: &mut PlayStatusPacket,
    ) -> Result<(), WireError> {
        packet.status = PlayStatus::try_from(buf.read_i32_be()?)?;
        Ok(())
    }
}

/// Server handshake
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerToClientHandshakeSerializerV422;

impl PacketSerializer<ServerToClientHandshakePacket> for ServerToClientHandshakeSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &ServerToClientHandshakePacket,
    ) -> Result<(), WireError> {
        helper.write_string(buf, &packet.jwt);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut ServerToClientHandshakePacket,
    ) -> Result<(), WireError> {
        packet.jwt = helper.read_string(buf)?;
        Ok(())
    }
}

/// Client handshake (no fields)
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientToServerHandshakeSerializerV422;

impl PacketSerializer<ClientToServerHandshakePacket> for ClientToServerHandshakeSerializerV422 {
    fn serialize(
        &self,
        _buf: &mut BytesMut,
        _helper: &dyn PacketHelper,
        _packet: &ClientToServerHandshakePacket,
    ) -> Result<(), WireError> {
        Ok(())
    }

    fn deserialize(
        &self,
        _buf: &mut Bytes,
        _helper: &dyn PacketHelper,
        _packet: &mut ClientToServerHandshakePacket,
    ) -> Result<(), WireError> {
        Ok(())
    }
}

/// Disconnect
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectSerializerV422;

impl PacketSerializer<DisconnectPacket> for DisconnectSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &DisconnectPacket,
    ) -> Result<(), WireError> {
        buf.put_bool(packet.message_skipped);
        if !packet.message_skipped {
            helper.write_string(buf, &packet.kick_message);
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut DisconnectPacket,
    ) -> Result<(), WireError> {
        packet.message_skipped = buf.read_bool()?;
        if !packet.message_skipped {
            packet.kick_message = helper.read_string(buf)?;
        }
        Ok(())
    }
}

/// Player input
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerInputSerializerV422;

impl PacketSerializer<PlayerInputPacket> for PlayerInputSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &PlayerInputPacket,
    ) -> Result<(), WireError> {
        helper.write_vector2f(buf, packet.input_motion);
        buf.put_bool(packet.jumping);
        buf.put_bool(packet.sneaking);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut PlayerInputPacket,
    ) -> Result<(), WireError> {
        packet.input_motion = helper.read_vector2f(buf)?;
        packet.jumping = buf.read_bool()?;
        packet.sneaking = buf.read_bool()?;
        Ok(())
    }
}

/// Simple event
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEventSerializerV422;

impl PacketSerializer<SimpleEventPacket> for SimpleEventSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        _helper: &dyn PacketHelper,
        packet: &SimpleEventPacket,
    ) -> Result<(), WireError> {
        buf.put_i16_le(packet.event as i16);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        _helper: &dyn PacketHelper,
        packet: &mut SimpleEventPacket,
    ) -> Result<(), WireError> {
        packet.event = SimpleEventType::try_from(buf.read_i16_le()?)?;
        Ok(())
    }
}

/// Store offer
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowStoreOfferSerializerV422;

impl PacketSerializer<ShowStoreOfferPacket> for ShowStoreOfferSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &ShowStoreOfferPacket,
    ) -> Result<(), WireError> {
        helper.write_string(buf, &packet.offer_id);
        buf.put_bool(packet.shown_to_all);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut ShowStoreOfferPacket,
    ) -> Result<(), WireError> {
        packet.offer_id = helper.read_string(buf)?;
        packet.shown_to_all = buf.read_bool()?;
        Ok(())
    }
}

/// Item frame drop
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFrameDropItemSerializerV422;

impl PacketSerializer<ItemFrameDropItemPacket> for ItemFrameDropItemSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &ItemFrameDropItemPacket,
    ) -> Result<(), WireError> {
        helper.write_block_position(buf, packet.block_position);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut ItemFrameDropItemPacket,
    ) -> Result<(), WireError> {
        packet.block_position = helper.read_block_position(buf)?;
        Ok(())
    }
}

/// Behavior tree
#[derive(Debug, Clone, Copy, Default)]
pub struct AddBehaviorTreeSerializerV422;

impl PacketSerializer<AddBehaviorTreePacket> for AddBehaviorTreeSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &AddBehaviorTreePacket,
    ) -> Result<(), WireError> {
        helper.write_string(buf, &packet.behavior_tree_json);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut AddBehaviorTreePacket,
    ) -> Result<(), WireError> {
        packet.behavior_tree_json = helper.read_string(buf)?;
        Ok(())
    }
}

/// Form request
#[derive(Debug, Clone, Copy, Default)]
pub struct ModalFormRequestSerializerV422;

impl PacketSerializer<ModalFormRequestPacket> for ModalFormRequestSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &ModalFormRequestPacket,
    ) -> Result<(), WireError> {
        buf.put_varuint32(packet.form_id);
        helper.write_string(buf, &packet.form_data);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut ModalFormRequestPacket,
    ) -> Result<(), WireError> {
        packet.form_id = buf.read_varuint32()?;
        packet.form_data = helper.read_string(buf)?;
        Ok(())
    }
}

/// Soft enum update
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateSoftEnumSerializerV422;

impl PacketSerializer<UpdateSoftEnumPacket> for UpdateSoftEnumSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &UpdateSoftEnumPacket,
    ) -> Result<(), WireError> {
        helper.write_string(buf, &packet.soft_enum.name);
        helper.write_string_list(buf, &packet.soft_enum.values);
        buf.put_u8(packet.update_type as u8);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut UpdateSoftEnumPacket,
    ) -> Result<(), WireError> {
        packet.soft_enum.name = helper.read_string(buf)?;
        packet.soft_enum.values = helper.read_string_list(buf)?;
        packet.update_type = SoftEnumUpdateType::try_from(buf.read_u8()?)?;
        Ok(())
    }
}

/// Emote
#[derive(Debug, Clone, Copy, Default)]
pub struct EmoteSerializerV422;

impl PacketSerializer<EmotePacket> for EmoteSerializerV422 {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &EmotePacket,
    ) -> Result<(), WireError> {
        buf.put_varuint64(packet.runtime_entity_id);
        helper.write_string(buf, &packet.emote_id);
        buf.put_u8(packet.flags.bits());
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut EmotePacket,
    ) -> Result<(), WireError> {
        packet.runtime_entity_id = buf.read_varuint64()?;
        packet.emote_id = helper.read_string(buf)?;
        packet.flags = EmoteFlags::from_bits_truncate(buf.read_u8()?);
        Ok(())
    }
}
