//! Packet model.
//!
//! Every concrete packet is a plain struct. [`PacketBody`] is the closed set
//! of all of them plus [`UnknownPacket`], and [`Packet`] adds the split-screen
//! sub-client addressing that travels in the batch frame header.

mod login;
mod world;

pub use login::{
    ClientToServerHandshakePacket, DisconnectPacket, LoginPacket, PlayStatus, PlayStatusPacket,
    ServerToClientHandshakePacket,
};
pub use world::{
    AddBehaviorTreePacket, CommandEnumData, EmoteFlags, EmotePacket, ItemFrameDropItemPacket,
    ModalFormRequestPacket, PlayerInputPacket, ShowStoreOfferPacket, SimpleEventPacket,
    SimpleEventType, SoftEnumUpdateType, UpdateSoftEnumPacket,
};

use bytes::Bytes;

/// Typed access to one [`PacketBody`] variant
pub trait PacketType: Default + Clone + Into<PacketBody> + Send + Sync + 'static {
    /// Discriminant of this packet type
    const KIND: PacketKind;

    /// Borrow this type out of a body
    fn from_body(body: &PacketBody) -> Option<&Self>;

    /// Mutably borrow this type out of a body
    fn from_body_mut(body: &mut PacketBody) -> Option<&mut Self>;
}

macro_rules! packets {
    ($($variant:ident($ty:ident) => $handle:ident;)+) => {
        /// Tagged body over every packet kind
        #[derive(Debug, Clone, PartialEq)]
        pub enum PacketBody {
            $(
                #[doc = concat!("[`", stringify!($ty), "`]")]
                $variant($ty),
            )+
            /// Packet whose ID the active table does not know
            Unknown(UnknownPacket),
        }

        /// Discriminant of [`PacketBody`]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind {
            $(
                #[doc = concat!("[`", stringify!($ty), "`]")]
                $variant,
            )+
            /// [`UnknownPacket`]
            Unknown,
        }

        impl PacketKind {
            /// Type name used in logs and errors
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($ty),)+
                    Self::Unknown => "UnknownPacket",
                }
            }
        }

        impl PacketBody {
            /// Discriminant of this body
            pub fn kind(&self) -> PacketKind {
                match self {
                    $(Self::$variant(_) => PacketKind::$variant,)+
                    Self::Unknown(_) => PacketKind::Unknown,
                }
            }

            /// Dispatch to the matching handler method
            pub fn handle(&self, handler: &mut dyn PacketHandler) -> bool {
                match self {
                    $(Self::$variant(packet) => handler.$handle(packet),)+
                    Self::Unknown(packet) => handler.handle_unknown(packet),
                }
            }
        }

        /// Application packet visitor.
        ///
        /// Each method returns whether the packet was handled; unhandled
        /// packets are logged by the default batch handler.
        pub trait PacketHandler: Send {
            $(
                #[doc = concat!("Handle a [`", stringify!($ty), "`]")]
                fn $handle(&mut self, packet: &$ty) -> bool {
                    let _ = packet;
                    false
                }
            )+

            /// Handle a packet the active table does not know
            fn handle_unknown(&mut self, packet: &UnknownPacket) -> bool {
                let _ = packet;
                false
            }
        }

        $(
            impl PacketType for $ty {
                const KIND: PacketKind = PacketKind::$variant;

                fn from_body(body: &PacketBody) -> Option<&Self> {
                    match body {
                        PacketBody::$variant(packet) => Some(packet),
                        _ => None,
                    }
                }

                fn from_body_mut(body: &mut PacketBody) -> Option<&mut Self> {
                    match body {
                        PacketBody::$variant(packet) => Some(packet),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for PacketBody {
                fn from(packet: $ty) -> Self {
                    Self::$variant(packet)
                }
            }

            impl From<$ty> for Packet {
                fn from(packet: $ty) -> Self {
                    Packet::new(packet)
                }
            }
        )+
    };
}

packets! {
    Login(LoginPacket) => handle_login;
    PlayStatus(PlayStatusPacket) => handle_play_status;
    ServerToClientHandshake(ServerToClientHandshakePacket) => handle_server_to_client_handshake;
    ClientToServerHandshake(ClientToServerHandshakePacket) => handle_client_to_server_handshake;
    Disconnect(DisconnectPacket) => handle_disconnect;
    PlayerInput(PlayerInputPacket) => handle_player_input;
    SimpleEvent(SimpleEventPacket) => handle_simple_event;
    ShowStoreOffer(ShowStoreOfferPacket) => handle_show_store_offer;
    ItemFrameDropItem(ItemFrameDropItemPacket) => handle_item_frame_drop_item;
    AddBehaviorTree(AddBehaviorTreePacket) => handle_add_behavior_tree;
    ModalFormRequest(ModalFormRequestPacket) => handle_modal_form_request;
    UpdateSoftEnum(UpdateSoftEnumPacket) => handle_update_soft_enum;
    Emote(EmotePacket) => handle_emote;
}

impl PacketKind {
    /// Whether batches carrying this kind may be encrypted.
    ///
    /// The server handshake always travels in clear text.
    pub fn is_encryptable(self) -> bool {
        !matches!(self, Self::ServerToClientHandshake)
    }
}

/// Packet with an ID the active table does not register
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownPacket {
    /// Numeric packet ID as read from the frame header
    pub id: u32,
    /// Raw field bytes, re-emitted verbatim on encode
    pub payload: Bytes,
}

/// A packet with its sub-client addressing
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Split-screen client that sent the packet
    pub sender_sub_client_id: u8,
    /// Split-screen client the packet is for
    pub target_sub_client_id: u8,
    /// Packet fields
    pub body: PacketBody,
}

impl Packet {
    /// Create a packet addressed to the primary client
    pub fn new(body: impl Into<PacketBody>) -> Self {
        Self {
            sender_sub_client_id: 0,
            target_sub_client_id: 0,
            body: body.into(),
        }
    }

    /// Set sub-client addressing
    pub fn with_sub_clients(mut self, sender: u8, target: u8) -> Self {
        self.sender_sub_client_id = sender;
        self.target_sub_client_id = target;
        self
    }

    /// Discriminant of the body
    pub fn kind(&self) -> PacketKind {
        self.body.kind()
    }

    /// Whether this packet may travel in an encrypted batch
    pub fn is_encryptable(&self) -> bool {
        self.kind().is_encryptable()
    }

    /// Borrow the body as a concrete packet type
    pub fn downcast_ref<T: PacketType>(&self) -> Option<&T> {
        T::from_body(&self.body)
    }

    /// Dispatch to the matching handler method
    pub fn handle(&self, handler: &mut dyn PacketHandler) -> bool {
        self.body.handle(handler)
    }
}

impl From<UnknownPacket> for Packet {
    fn from(packet: UnknownPacket) -> Self {
        Packet::new(PacketBody::Unknown(packet))
    }
}
