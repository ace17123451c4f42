//! Field-level packet serializers.
//!
//! A serializer reads and writes the fields of one packet type for one
//! protocol version. Tables register a serializer per packet type, so a
//! version that changes one packet swaps only that serializer.

pub mod compat;
pub mod v422;

use crate::error::WireError;
use crate::helper::PacketHelper;
use crate::packet::{PacketBody, PacketType};
use bytes::{Bytes, BytesMut};
use std::marker::PhantomData;

/// Reads and writes the fields of `T`
pub trait PacketSerializer<T>: Send + Sync {
    /// Write the fields of `packet`
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        packet: &T,
    ) -> Result<(), WireError>;

    /// Read fields into a freshly constructed `packet`
    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        packet: &mut T,
    ) -> Result<(), WireError>;
}

/// Serializer over the whole [`PacketBody`] enum
pub(crate) trait BodySerializer: Send + Sync {
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        body: &PacketBody,
    ) -> Result<(), WireError>;

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        body: &mut PacketBody,
    ) -> Result<(), WireError>;
}

/// Binds a typed serializer to its body variant
pub(crate) struct Typed<T, S> {
    serializer: S,
    _packet: PhantomData<fn() -> T>,
}

impl<T, S> Typed<T, S> {
    pub(crate) fn new(serializer: S) -> Self {
        Self {
            serializer,
            _packet: PhantomData,
        }
    }
}

impl<T, S> BodySerializer for Typed<T, S>
where
    T: PacketType,
    S: PacketSerializer<T>,
{
    fn serialize(
        &self,
        buf: &mut BytesMut,
        helper: &dyn PacketHelper,
        body: &PacketBody,
    ) -> Result<(), WireError> {
        let packet = T::from_body(body).ok_or(WireError::Unregistered(body.kind().name()))?;
        self.serializer.serialize(buf, helper, packet)
    }

    fn deserialize(
        &self,
        buf: &mut Bytes,
        helper: &dyn PacketHelper,
        body: &mut PacketBody,
    ) -> Result<(), WireError> {
        let kind = body.kind();
        let packet = T::from_body_mut(body).ok_or(WireError::Unregistered(kind.name()))?;
        self.serializer.deserialize(buf, helper, packet)
    }
}
