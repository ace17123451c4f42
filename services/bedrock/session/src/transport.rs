//! Reliable-datagram transport interfaces.
//!
//! The session layer runs on top of any transport that can report connection
//! state changes, deliver ordered encapsulated payloads and send bytes back.
//! Each connection hands its events to the session layer over an unbounded
//! channel so they are processed in arrival order.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not yet contacted
    Unconnected,
    /// Handshake in progress
    Connecting,
    /// Ready for payloads
    Connected,
    /// Shutting down
    Disconnecting,
    /// Gone
    Disconnected,
}

impl ConnectionState {
    /// Whether the connection can no longer carry payloads
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Disconnecting | Self::Disconnected)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Peer closed the connection
    ClosedByRemotePeer,
    /// Local endpoint shut down
    ShuttingDown,
    /// Closed locally
    Disconnected,
    /// Peer stopped responding
    TimedOut,
    /// Peer refused the connection
    ConnectionRequestFailed,
    /// Peer is already connected
    AlreadyConnected,
    /// Peer has no free slots
    NoFreeIncomingConnections,
    /// Transport versions differ
    IncompatibleProtocolVersion,
    /// Malformed transport packet
    BadPacket,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ClosedByRemotePeer => "closed by remote peer",
            Self::ShuttingDown => "shutting down",
            Self::Disconnected => "disconnected",
            Self::TimedOut => "timed out",
            Self::ConnectionRequestFailed => "connection request failed",
            Self::AlreadyConnected => "already connected",
            Self::NoFreeIncomingConnections => "no free incoming connections",
            Self::IncompatibleProtocolVersion => "incompatible protocol version",
            Self::BadPacket => "bad packet",
        };
        f.write_str(reason)
    }
}

/// Event raised by a transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection moved to a new state
    StateChanged(ConnectionState),
    /// Ordered payload from the peer
    Encapsulated(Bytes),
    /// Connection ended; always the last event
    Disconnected(DisconnectReason),
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint has not been bound
    #[error("endpoint is not bound")]
    NotBound,

    /// Endpoint could not bind its address
    #[error("address {0} is already in use")]
    AddressInUse(SocketAddr),

    /// Endpoint has been closed
    #[error("endpoint is closed")]
    Closed,
}

/// One transport connection
pub trait TransportConnection: Send + Sync + fmt::Debug {
    /// Queue an ordered, reliable payload
    fn send(&self, payload: Bytes);

    /// Peer address
    fn address(&self) -> SocketAddr;

    /// Peer address before any proxy rewrite
    fn real_address(&self) -> SocketAddr {
        self.address()
    }

    /// Current round-trip time
    fn ping(&self) -> Duration;

    /// Negotiated transport protocol version
    fn protocol_version(&self) -> u8;

    /// Current state
    fn state(&self) -> ConnectionState;

    /// Whether the connection can no longer carry payloads
    fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Close the connection
    fn disconnect(&self, reason: DisconnectReason);
}

/// A connection and the channel its events arrive on
#[derive(Debug)]
pub struct Connection {
    /// Connection handle
    pub handle: Arc<dyn TransportConnection>,
    /// Event stream, ends after [`ConnectionEvent::Disconnected`]
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

/// Client side of a transport
#[async_trait]
pub trait TransportClient: Send + Sync + fmt::Debug {
    /// Bind the local endpoint
    async fn bind(&self) -> Result<(), TransportError>;

    /// Send an unconnected ping and wait for the status payload
    async fn ping(&self, address: SocketAddr) -> Result<Bytes, TransportError>;

    /// Open a connection; it reports `Connected` on its event stream
    async fn connect(&self, address: SocketAddr) -> Result<Connection, TransportError>;

    /// Transport protocol version offered on connect
    fn set_protocol_version(&self, version: u8);

    /// Endpoint GUID
    fn guid(&self) -> u64;

    /// Close the endpoint and every connection on it
    async fn close(&self);
}

/// Callbacks from a server transport
pub trait ServerListener: Send + Sync {
    /// Whether to accept a new peer
    fn on_connection_request(&self, address: SocketAddr, real_address: SocketAddr) -> bool;

    /// Status payload for an unconnected ping; `None` stays silent
    fn on_query(&self, address: SocketAddr) -> Option<Bytes>;

    /// A connection was created; it reports `Connected` on its event stream
    fn on_session_creation(&self, connection: Connection);

    /// Datagram the transport did not understand
    fn on_unhandled_datagram(&self, address: SocketAddr, payload: Bytes);
}

/// Server side of a transport
#[async_trait]
pub trait TransportServer: Send + Sync + fmt::Debug {
    /// Bind the local endpoint and start delivering callbacks
    async fn bind(&self, listener: Arc<dyn ServerListener>) -> Result<(), TransportError>;

    /// Local address
    fn local_address(&self) -> SocketAddr;

    /// Endpoint GUID
    fn guid(&self) -> u64;

    /// Close the endpoint and every connection on it
    async fn close(&self);
}
