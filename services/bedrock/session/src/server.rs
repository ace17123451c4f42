//! Server lifecycle: accepts connections and tracks live sessions.

use crate::handler::BedrockServerEventHandler;
use crate::lifecycle::{spawn_driver, spawn_ticker, SessionListener};
use crate::session::{BedrockSession, SessionConfig, DEFAULT_DISCONNECT_MESSAGE};
use crate::transport::{
    Connection, ConnectionState, DisconnectReason, ServerListener, TransportError, TransportServer,
};
use bedrock_wire::{compat_codec, wrapper_for_version, CodecBuildError, PacketCodec};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// State shared with transport callbacks and session drivers
struct ServerInner {
    codec: RwLock<Arc<PacketCodec>>,
    config: SessionConfig,
    guid: u64,
    sessions: DashMap<SocketAddr, Arc<BedrockSession>>,
    handler: RwLock<Option<Arc<dyn BedrockServerEventHandler>>>,
}

impl ServerInner {
    fn handler(&self) -> Option<Arc<dyn BedrockServerEventHandler>> {
        self.handler.read().clone()
    }
}

/// Accepts Bedrock connections on a transport server
pub struct BedrockServer {
    transport: Arc<dyn TransportServer>,
    inner: Arc<ServerInner>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl BedrockServer {
    /// Create a server whose sessions start on the compat table
    pub fn new(
        transport: Arc<dyn TransportServer>,
        config: SessionConfig,
    ) -> Result<Self, CodecBuildError> {
        Ok(Self::with_codec(transport, compat_codec()?, config))
    }

    /// Create a server whose sessions start on `codec`
    pub fn with_codec(
        transport: Arc<dyn TransportServer>,
        codec: Arc<PacketCodec>,
        config: SessionConfig,
    ) -> Self {
        let inner = ServerInner {
            codec: RwLock::new(codec),
            config,
            guid: transport.guid(),
            sessions: DashMap::new(),
            handler: RwLock::new(None),
        };
        Self {
            transport,
            inner: Arc::new(inner),
            ticker: Mutex::new(None),
        }
    }

    /// Attach the application event handler
    pub fn set_handler(&self, handler: Arc<dyn BedrockServerEventHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    /// Bind the transport and start flushing every session each tick
    pub async fn bind(&self) -> Result<(), TransportError> {
        let listener = Arc::new(ServerEvents(Arc::clone(&self.inner)));
        self.transport.bind(listener).await?;

        let inner = Arc::clone(&self.inner);
        let ticker = spawn_ticker(inner.config.tick_interval, move || {
            for entry in inner.sessions.iter() {
                entry.value().request_flush();
            }
        });
        if let Some(previous) = self.ticker.lock().replace(ticker) {
            previous.abort();
        }

        info!("Bedrock server listening on {}", self.transport.local_address());
        Ok(())
    }

    /// Local address
    pub fn local_address(&self) -> SocketAddr {
        self.transport.local_address()
    }

    /// Transport GUID
    pub fn guid(&self) -> u64 {
        self.inner.guid
    }

    /// Connected sessions
    pub fn sessions(&self) -> Vec<Arc<BedrockSession>> {
        self.inner
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Session of a peer
    pub fn session(&self, address: &SocketAddr) -> Option<Arc<BedrockSession>> {
        self.inner.sessions.get(address).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of connected sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Packet table for new sessions
    pub fn packet_codec(&self) -> Arc<PacketCodec> {
        Arc::clone(&self.inner.codec.read())
    }

    /// Replace the packet table for new sessions
    pub fn set_packet_codec(&self, codec: Arc<PacketCodec>) {
        *self.inner.codec.write() = codec;
    }

    /// Disconnect every session with the default reason and close
    pub async fn close(&self) {
        self.close_with_reason(DEFAULT_DISCONNECT_MESSAGE).await;
    }

    /// Disconnect every session with `reason` and close
    pub async fn close_with_reason(&self, reason: &str) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }

        let sessions = self.sessions();
        self.inner.sessions.clear();
        for session in sessions {
            if let Err(e) = session.disconnect_with_reason(Some(reason), false) {
                debug!("Session {} already closed: {}", session.address(), e);
            }
        }

        self.transport.close().await;
        info!("Bedrock server on {} closed", self.transport.local_address());
    }
}

impl std::fmt::Debug for BedrockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockServer")
            .field("transport", &self.transport)
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}

/// Transport callbacks
struct ServerEvents(Arc<ServerInner>);

impl ServerListener for ServerEvents {
    fn on_connection_request(&self, address: SocketAddr, real_address: SocketAddr) -> bool {
        match self.0.handler() {
            Some(handler) => handler.on_connection_request(address, real_address),
            None => true,
        }
    }

    fn on_query(&self, address: SocketAddr) -> Option<Bytes> {
        let mut pong = self.0.handler()?.on_query(address)?;
        pong.server_id = self.0.guid as i64;
        Some(pong.to_raknet())
    }

    fn on_session_creation(&self, connection: Connection) {
        let Connection { handle, events } = connection;
        let wrapper = wrapper_for_version(handle.protocol_version());
        let codec = Arc::clone(&self.0.codec.read());
        let session = Arc::new(BedrockSession::server(handle, wrapper, codec, &self.0.config));

        debug!("Created session for {}", session.address());
        let listener = ServerSessionListener {
            inner: Arc::clone(&self.0),
            registered: false,
        };
        spawn_driver(session, events, listener);
    }

    fn on_unhandled_datagram(&self, address: SocketAddr, payload: Bytes) {
        if let Some(handler) = self.0.handler() {
            handler.on_unhandled_datagram(address, payload);
        }
    }
}

/// Registers a session once connected and forgets it on disconnect
struct ServerSessionListener {
    inner: Arc<ServerInner>,
    registered: bool,
}

impl SessionListener for ServerSessionListener {
    fn on_state_changed(&mut self, session: &Arc<BedrockSession>, state: ConnectionState) {
        if state != ConnectionState::Connected || self.registered {
            return;
        }
        self.registered = true;
        self.inner
            .sessions
            .insert(session.address(), Arc::clone(session));
        info!("Session connected from {}", session.address());

        if let Some(handler) = self.inner.handler() {
            handler.on_session_creation(Arc::clone(session));
        }
    }

    fn on_disconnect(&mut self, session: &Arc<BedrockSession>, reason: DisconnectReason) {
        self.inner
            .sessions
            .remove_if(&session.address(), |_, current| Arc::ptr_eq(current, session));
        info!("Session {} disconnected: {}", session.address(), reason);
    }
}
