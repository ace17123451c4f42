//! In-game packets.

use crate::error::WireError;
use crate::helper::{BlockPosition, Vector2f};
use bitflags::bitflags;

/// Movement input from a ridden entity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInputPacket {
    /// Strafe/forward motion
    pub input_motion: Vector2f,
    /// Jump held
    pub jumping: bool,
    /// Sneak held
    pub sneaking: bool,
}

/// Simple world events
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimpleEventType {
    /// Commands were enabled
    #[default]
    CommandsEnabled = 1,
    /// Commands were disabled
    CommandsDisabled = 2,
    /// World template settings unlocked
    UnlockWorldTemplateSettings = 3,
}

impl TryFrom<i16> for SimpleEventType {
    type Error = WireError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::CommandsEnabled),
            2 => Ok(Self::CommandsDisabled),
            3 => Ok(Self::UnlockWorldTemplateSettings),
            _ => Err(WireError::InvalidEnum {
                kind: "simple event",
                value: i64::from(value),
            }),
        }
    }
}

/// Simple world event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimpleEventPacket {
    /// Event type
    pub event: SimpleEventType,
}

/// Opens the marketplace offer screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShowStoreOfferPacket {
    /// Offer identifier
    pub offer_id: String,
    /// Shown to every player
    pub shown_to_all: bool,
}

/// Player knocked the item out of an item frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFrameDropItemPacket {
    /// Position of the frame
    pub block_position: BlockPosition,
}

/// Behavior tree definition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddBehaviorTreePacket {
    /// Tree JSON
    pub behavior_tree_json: String,
}

/// Server form sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModalFormRequestPacket {
    /// Identifier echoed back in the response
    pub form_id: u32,
    /// Form JSON
    pub form_data: String,
}

/// Named command enum whose values change at runtime
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandEnumData {
    /// Enum name
    pub name: String,
    /// Current values
    pub values: Vec<String>,
}

/// How a soft enum update applies
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftEnumUpdateType {
    /// Append values
    #[default]
    Add = 0,
    /// Remove values
    Remove = 1,
    /// Replace all values
    Set = 2,
}

impl TryFrom<u8> for SoftEnumUpdateType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Remove),
            2 => Ok(Self::Set),
            _ => Err(WireError::InvalidEnum {
                kind: "soft enum update",
                value: i64::from(value),
            }),
        }
    }
}

/// Soft enum update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateSoftEnumPacket {
    /// Enum being updated
    pub soft_enum: CommandEnumData,
    /// Update mode
    pub update_type: SoftEnumUpdateType,
}

bitflags! {
    /// Emote flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EmoteFlags: u8 {
        /// Emote originated on the server
        const SERVER_SIDE = 0b0000_0001;
        /// Suppress the chat announcement
        const MUTE_ANNOUNCEMENT = 0b0000_0010;
    }
}

/// Entity plays an emote
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmotePacket {
    /// Runtime ID of the emoting entity
    pub runtime_entity_id: u64,
    /// Emote piece identifier
    pub emote_id: String,
    /// Emote flags
    pub flags: EmoteFlags,
}
