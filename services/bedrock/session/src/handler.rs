//! Callback traits for received batches and server events.

use crate::session::BedrockSession;
use bedrock_wire::{BedrockPong, Packet};
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Receives every decoded batch of a session
pub trait BatchHandler: Send + Sync + fmt::Debug {
    /// Handle the packets of one batch.
    ///
    /// `compressed` is the batch payload after decryption, before
    /// decompression.
    fn handle(&self, session: &BedrockSession, compressed: &[u8], packets: Vec<Packet>);
}

/// Dispatches each packet in order to the session's packet handler
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBatchHandler;

impl BatchHandler for DefaultBatchHandler {
    fn handle(&self, session: &BedrockSession, _compressed: &[u8], packets: Vec<Packet>) {
        for packet in packets {
            if !session.dispatch(&packet) {
                debug!(
                    "Unhandled packet {} from {}",
                    packet.kind().name(),
                    session.address()
                );
            }
        }
    }
}

/// Callbacks from a [`BedrockServer`](crate::server::BedrockServer)
pub trait BedrockServerEventHandler: Send + Sync {
    /// Whether to accept a connection from `address`
    fn on_connection_request(&self, address: SocketAddr, real_address: SocketAddr) -> bool {
        let _ = (address, real_address);
        true
    }

    /// Status record for an unconnected ping; `None` stays silent.
    ///
    /// The server stamps `server_id` with its transport GUID.
    fn on_query(&self, address: SocketAddr) -> Option<BedrockPong> {
        let _ = address;
        None
    }

    /// A session reached the connected state
    fn on_session_creation(&self, session: Arc<BedrockSession>);

    /// Datagram the transport did not understand
    fn on_unhandled_datagram(&self, address: SocketAddr, payload: Bytes) {
        let _ = (address, payload);
    }
}
