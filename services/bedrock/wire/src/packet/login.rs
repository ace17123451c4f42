//! Login, handshake and disconnect packets.

use crate::error::WireError;

/// Client login: protocol version plus the JWT chain and skin blobs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginPacket {
    /// Protocol version the client speaks
    pub protocol_version: i32,
    /// JWT chain JSON
    pub chain_data: String,
    /// Skin JWT
    pub skin_data: String,
}

/// Login/spawn status codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayStatus {
    /// Login accepted
    #[default]
    LoginSuccess = 0,
    /// Client is outdated
    LoginFailedClientOld = 1,
    /// Server is outdated
    LoginFailedServerOld = 2,
    /// Player may spawn
    PlayerSpawn = 3,
    /// Education tenant is invalid
    LoginFailedInvalidTenant = 4,
    /// Vanilla client tried to join an education server
    LoginFailedEditionMismatchEduToVanilla = 5,
    /// Education client tried to join a vanilla server
    LoginFailedEditionMismatchVanillaToEdu = 6,
    /// Server is full
    FailedServerFull = 7,
}

impl TryFrom<i32> for PlayStatus {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::LoginSuccess),
            1 => Ok(Self::LoginFailedClientOld),
            2 => Ok(Self::LoginFailedServerOld),
            3 => Ok(Self::PlayerSpawn),
            4 => Ok(Self::LoginFailedInvalidTenant),
            5 => Ok(Self::LoginFailedEditionMismatchEduToVanilla),
            6 => Ok(Self::LoginFailedEditionMismatchVanillaToEdu),
            7 => Ok(Self::FailedServerFull),
            _ => Err(WireError::InvalidEnum {
                kind: "play status",
                value: i64::from(value),
            }),
        }
    }
}

/// Play status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayStatusPacket {
    /// Status code
    pub status: PlayStatus,
}

impl PlayStatusPacket {
    /// Create a status packet
    pub fn new(status: PlayStatus) -> Self {
        Self { status }
    }
}

/// Server half of the encryption handshake; never encrypted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerToClientHandshakePacket {
    /// Signed JWT carrying the server public key and salt
    pub jwt: String,
}

/// Client acknowledgement that encryption is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientToServerHandshakePacket;

/// Disconnect notice with an optional kick message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisconnectPacket {
    /// Client shows its generic screen instead of the message
    pub message_skipped: bool,
    /// Message shown to the player
    pub kick_message: String,
}

impl DisconnectPacket {
    /// Disconnect that shows `message`
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message_skipped: false,
            kick_message: message.into(),
        }
    }

    /// Disconnect that hides the reason
    pub fn hidden() -> Self {
        Self {
            message_skipped: true,
            kick_message: String::new(),
        }
    }
}
