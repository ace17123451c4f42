//! Client lifecycle: status pings and a single outbound session.

use crate::error::ClientError;
use crate::lifecycle::{spawn_driver, spawn_ticker, SessionListener};
use crate::session::{BedrockSession, SessionConfig};
use crate::transport::{ConnectionState, DisconnectReason, TransportClient};
use bedrock_wire::{compat_codec, wrapper_for_version, BedrockPong, CodecBuildError, PacketCodec, WrapperSerializer};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type SessionSlot = Arc<Mutex<Option<Arc<BedrockSession>>>>;

/// Connects to one Bedrock server at a time
#[derive(Debug)]
pub struct BedrockClient {
    transport: Arc<dyn TransportClient>,
    codec: RwLock<Arc<PacketCodec>>,
    config: SessionConfig,
    session: SessionSlot,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl BedrockClient {
    /// Create a client whose sessions start on the compat table
    pub fn new(
        transport: Arc<dyn TransportClient>,
        config: SessionConfig,
    ) -> Result<Self, CodecBuildError> {
        Ok(Self::with_codec(transport, compat_codec()?, config))
    }

    /// Create a client whose sessions start on `codec`
    pub fn with_codec(
        transport: Arc<dyn TransportClient>,
        codec: Arc<PacketCodec>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            codec: RwLock::new(codec),
            config,
            session: Arc::new(Mutex::new(None)),
            ticker: Mutex::new(None),
        }
    }

    /// Bind the transport and start flushing the session every tick
    pub async fn bind(&self) -> Result<(), ClientError> {
        self.transport.bind().await?;

        let slot = Arc::clone(&self.session);
        let ticker = spawn_ticker(self.config.tick_interval, move || {
            if let Some(session) = slot.lock().as_ref() {
                session.request_flush();
            }
        });
        if let Some(previous) = self.ticker.lock().replace(ticker) {
            previous.abort();
        }

        debug!("Client bound with guid {}", self.transport.guid());
        Ok(())
    }

    /// Fetch the status record of a server
    pub async fn ping(&self, address: SocketAddr) -> Result<BedrockPong, ClientError> {
        self.ping_with_timeout(address, self.config.ping_timeout).await
    }

    /// Fetch the status record of a server, giving up after `limit`
    pub async fn ping_with_timeout(
        &self,
        address: SocketAddr,
        limit: Duration,
    ) -> Result<BedrockPong, ClientError> {
        match timeout(limit, self.transport.ping(address)).await {
            Ok(reply) => Ok(BedrockPong::from_raknet(&reply?)),
            Err(_) => Err(ClientError::PingTimeout(address)),
        }
    }

    /// Ping the server, then connect to the port it advertises
    pub async fn connect(&self, address: SocketAddr) -> Result<Arc<BedrockSession>, ClientError> {
        let pong = self.ping(address).await?;
        let port = pong.port_for(address.is_ipv6()).unwrap_or(address.port());

        let mut target = address;
        target.set_port(port);
        if target != address {
            debug!("Server at {} advertises game port {}", address, port);
        }

        self.direct_connect(target).await
    }

    /// Connect without pinging first.
    ///
    /// Resolves once the transport reports the connection as connected.
    pub async fn direct_connect(
        &self,
        address: SocketAddr,
    ) -> Result<Arc<BedrockSession>, ClientError> {
        let connection = self.transport.connect(address).await?;
        let wrapper = wrapper_for_version(connection.handle.protocol_version());
        let session = Arc::new(BedrockSession::client(
            connection.handle,
            wrapper,
            self.packet_codec(),
            &self.config,
        ));

        if let Some(previous) = self.session.lock().replace(Arc::clone(&session)) {
            if !previous.is_closed() {
                warn!("Replacing open session to {}", previous.address());
            }
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = ClientListener {
            ready: Some(ready_tx),
            slot: Arc::clone(&self.session),
        };
        spawn_driver(Arc::clone(&session), connection.events, listener);

        let result = match timeout(self.config.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                info!("Connected to {} using transport version {}", address, wrapper.version());
                return Ok(session);
            }
            Ok(Ok(Err(reason))) => Err(ClientError::ConnectionFailed(reason)),
            Ok(Err(_)) => Err(ClientError::ConnectionFailed(DisconnectReason::Disconnected)),
            Err(_) => {
                session.connection().disconnect(DisconnectReason::TimedOut);
                session.close(DisconnectReason::TimedOut);
                Err(ClientError::ConnectTimeout(address))
            }
        };

        clear_slot(&self.session, &session);
        result
    }

    /// Current session, if any
    pub fn session(&self) -> Option<Arc<BedrockSession>> {
        self.session.lock().clone()
    }

    /// Packet table for new sessions
    pub fn packet_codec(&self) -> Arc<PacketCodec> {
        Arc::clone(&self.codec.read())
    }

    /// Replace the packet table for new sessions
    pub fn set_packet_codec(&self, codec: Arc<PacketCodec>) {
        *self.codec.write() = codec;
    }

    /// Transport protocol version offered on connect
    pub fn set_transport_protocol_version(&self, version: u8) {
        self.transport.set_protocol_version(version);
    }

    /// Transport GUID
    pub fn guid(&self) -> u64 {
        self.transport.guid()
    }

    /// Stop ticking, disconnect the session and close the transport
    pub async fn close(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }

        let session = self.session.lock().take();
        if let Some(session) = session {
            if let Err(e) = session.disconnect() {
                debug!("Session to {} already closed: {}", session.address(), e);
            }
        }

        self.transport.close().await;
    }
}

fn clear_slot(slot: &SessionSlot, session: &Arc<BedrockSession>) {
    let mut slot = slot.lock();
    if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
        *slot = None;
    }
}

struct ClientListener {
    ready: Option<oneshot::Sender<Result<(), DisconnectReason>>>,
    slot: SessionSlot,
}

impl SessionListener for ClientListener {
    fn on_state_changed(&mut self, _session: &Arc<BedrockSession>, state: ConnectionState) {
        if state == ConnectionState::Connected {
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(Ok(()));
            }
        }
    }

    fn on_disconnect(&mut self, session: &Arc<BedrockSession>, reason: DisconnectReason) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(reason));
        }
        clear_slot(&self.slot, session);
        info!("Disconnected from {}: {}", session.address(), reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BedrockServerEventHandler;
    use crate::memory::MemoryNetwork;
    use crate::server::BedrockServer;
    use crate::transport::TransportError;
    struct Refuse;

    impl BedrockServerEventHandler for Refuse {
        fn on_connection_request(&self, _address: SocketAddr, _real: SocketAddr) -> bool {
            false
        }

        fn on_session_creation(&self, _session: Arc<BedrockSession>) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_to_silent_address_fails() {
        let network = MemoryNetwork::new();
        let client = BedrockClient::new(Arc::new(network.client()), SessionConfig::default()).unwrap();
        client.bind().await.unwrap();
        let address: SocketAddr = "127.0.0.1:19199".parse().unwrap();

        assert!(matches!(
            client.connect(address).await,
            Err(ClientError::PingTimeout(a)) if a == address
        ));
        assert!(matches!(
            client.direct_connect(address).await,
            Err(ClientError::ConnectTimeout(a)) if a == address
        ));
        assert!(client.session().is_none());
        client.close().await;
    }

    #[tokio::test]
    async fn test_refused_connection_carries_reason() {
        let network = MemoryNetwork::new();
        let address: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        let server = BedrockServer::new(Arc::new(network.server(address)), SessionConfig::default()).unwrap();
        server.set_handler(Arc::new(Refuse));
        server.bind().await.unwrap();

        let client = BedrockClient::new(Arc::new(network.client()), SessionConfig::default()).unwrap();
        client.bind().await.unwrap();
        assert!(matches!(
            client.direct_connect(address).await,
            Err(ClientError::ConnectionFailed(DisconnectReason::ConnectionRequestFailed))
        ));
        assert!(client.session().is_none());
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_unbound_client_rejected() {
        let network = MemoryNetwork::new();
        let client = BedrockClient::new(Arc::new(network.client()), SessionConfig::default()).unwrap();
        let address: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        assert!(matches!(
            client.direct_connect(address).await,
            Err(ClientError::Transport(TransportError::NotBound))
        ));
    }
}
