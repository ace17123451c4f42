//! In-memory transport for tests and single-process demos.
//!
//! Endpoints live in a shared [`MemoryNetwork`] keyed by socket address.
//! Payloads are delivered in order through each connection's event channel;
//! there is no loss, fragmentation or retransmission. Every payload a
//! connection sends is also kept for inspection.

use crate::transport::{
    Connection, ConnectionEvent, ConnectionState, DisconnectReason, ServerListener,
    TransportClient, TransportConnection, TransportError, TransportServer,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const FIRST_CLIENT_PORT: u16 = 40000;
const FIRST_GUID: u64 = 0x4d45_4d00_0000_0001;

/// Server endpoint registered on the network
struct Endpoint {
    listener: Arc<dyn ServerListener>,
    connections: Mutex<Vec<Weak<MemoryConnection>>>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

/// Shared address space for memory endpoints
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    endpoints: Arc<DashMap<SocketAddr, Arc<Endpoint>>>,
    next_port: Arc<AtomicU16>,
    next_guid: Arc<AtomicU64>,
    latency: Duration,
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            next_port: Arc::new(AtomicU16::new(FIRST_CLIENT_PORT)),
            next_guid: Arc::new(AtomicU64::new(FIRST_GUID)),
            latency: Duration::ZERO,
        }
    }

    /// Set the round-trip time connections report
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Create a client endpoint with a fresh local address
    pub fn client(&self) -> MemoryClient {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        MemoryClient {
            network: self.clone(),
            local: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            guid: self.next_guid(),
            protocol_version: AtomicU8::new(bedrock_wire::DEFAULT_TRANSPORT_PROTOCOL_VERSION),
            bound: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Create a server endpoint for `address`
    pub fn server(&self, address: SocketAddr) -> MemoryServer {
        MemoryServer {
            network: self.clone(),
            address,
            guid: self.next_guid(),
        }
    }

    fn next_guid(&self) -> u64 {
        self.next_guid.fetch_add(1, Ordering::Relaxed)
    }

    fn endpoint(&self, address: SocketAddr) -> Option<Arc<Endpoint>> {
        self.endpoints.get(&address).map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of a memory connection
pub struct MemoryConnection {
    local: SocketAddr,
    remote: SocketAddr,
    protocol_version: u8,
    latency: Duration,
    state: Mutex<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    peer: Mutex<Weak<MemoryConnection>>,
    sent: Mutex<Vec<Bytes>>,
}

impl MemoryConnection {
    fn new(
        local: SocketAddr,
        remote: SocketAddr,
        protocol_version: u8,
        latency: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            local,
            remote,
            protocol_version,
            latency,
            state: Mutex::new(ConnectionState::Unconnected),
            events,
            peer: Mutex::new(Weak::new()),
            sent: Mutex::new(Vec::new()),
        });
        (connection, rx)
    }

    /// Two linked, already connected connections
    pub fn pair(
        a: SocketAddr,
        b: SocketAddr,
        protocol_version: u8,
    ) -> (Arc<MemoryConnection>, Connection, Arc<MemoryConnection>, Connection) {
        let (left, left_events) = Self::new(a, b, protocol_version, Duration::ZERO);
        let (right, right_events) = Self::new(b, a, protocol_version, Duration::ZERO);
        link(&left, &right);
        left.set_state(ConnectionState::Connected);
        right.set_state(ConnectionState::Connected);

        let left_handle: Arc<dyn TransportConnection> = left.clone();
        let right_handle: Arc<dyn TransportConnection> = right.clone();
        (
            left,
            Connection {
                handle: left_handle,
                events: left_events,
            },
            right,
            Connection {
                handle: right_handle,
                events: right_events,
            },
        )
    }

    /// Local address
    pub fn local_address(&self) -> SocketAddr {
        self.local
    }

    /// Every payload sent so far, in order
    pub fn sent_payloads(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state == next || *state == ConnectionState::Disconnected {
            return;
        }
        *state = next;
        let _ = self.events.send(ConnectionEvent::StateChanged(next));
    }

    fn deliver(&self, payload: Bytes) {
        if *self.state.lock() == ConnectionState::Connected {
            let _ = self.events.send(ConnectionEvent::Encapsulated(payload));
        }
    }

    fn terminate(&self, reason: DisconnectReason) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        let _ = self.events.send(ConnectionEvent::Disconnected(reason));
    }
}

fn link(a: &Arc<MemoryConnection>, b: &Arc<MemoryConnection>) {
    *a.peer.lock() = Arc::downgrade(b);
    *b.peer.lock() = Arc::downgrade(a);
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl TransportConnection for MemoryConnection {
    fn send(&self, payload: Bytes) {
        if self.state() != ConnectionState::Connected {
            debug!("Dropping {} byte payload to {}: not connected", payload.len(), self.remote);
            return;
        }
        self.sent.lock().push(payload.clone());
        if let Some(peer) = self.peer.lock().upgrade() {
            peer.deliver(payload);
        }
    }

    fn address(&self) -> SocketAddr {
        self.remote
    }

    fn ping(&self) -> Duration {
        self.latency
    }

    fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn disconnect(&self, reason: DisconnectReason) {
        self.terminate(reason);
        let peer = self.peer.lock().upgrade();
        if let Some(peer) = peer {
            peer.terminate(DisconnectReason::ClosedByRemotePeer);
        }
    }
}

/// Client endpoint on a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryClient {
    network: MemoryNetwork,
    local: SocketAddr,
    guid: u64,
    protocol_version: AtomicU8,
    bound: AtomicBool,
    closed: AtomicBool,
    connections: Mutex<Vec<Weak<MemoryConnection>>>,
}

impl MemoryClient {
    /// Local address
    pub fn local_address(&self) -> SocketAddr {
        self.local
    }

    fn ensure_bound(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if !self.bound.load(Ordering::Acquire) {
            return Err(TransportError::NotBound);
        }
        Ok(())
    }
}

#[async_trait]
impl TransportClient for MemoryClient {
    async fn bind(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.bound.store(true, Ordering::Release);
        Ok(())
    }

    async fn ping(&self, address: SocketAddr) -> Result<Bytes, TransportError> {
        self.ensure_bound()?;
        let reply = self
            .network
            .endpoint(address)
            .and_then(|endpoint| endpoint.listener.on_query(self.local));

        match reply {
            Some(payload) => Ok(payload),
            // Unanswered pings never complete; callers apply their own timeout
            None => std::future::pending().await,
        }
    }

    async fn connect(&self, address: SocketAddr) -> Result<Connection, TransportError> {
        self.ensure_bound()?;
        let version = self.protocol_version.load(Ordering::Relaxed);
        let (client, events) =
            MemoryConnection::new(self.local, address, version, self.network.latency);
        client.set_state(ConnectionState::Connecting);
        self.connections.lock().push(Arc::downgrade(&client));

        if let Some(endpoint) = self.network.endpoint(address) {
            if !endpoint.listener.on_connection_request(self.local, self.local) {
                client.terminate(DisconnectReason::ConnectionRequestFailed);
            } else {
                let (server, server_events) =
                    MemoryConnection::new(address, self.local, version, self.network.latency);
                link(&client, &server);
                endpoint.connections.lock().push(Arc::downgrade(&server));

                let handle: Arc<dyn TransportConnection> = server.clone();
                endpoint.listener.on_session_creation(Connection {
                    handle,
                    events: server_events,
                });
                server.set_state(ConnectionState::Connected);
                client.set_state(ConnectionState::Connected);
            }
        }

        Ok(Connection {
            handle: client,
            events,
        })
    }

    fn set_protocol_version(&self, version: u8) {
        self.protocol_version.store(version, Ordering::Relaxed);
    }

    fn guid(&self) -> u64 {
        self.guid
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let connections = std::mem::take(&mut *self.connections.lock());
        for connection in connections.iter().filter_map(Weak::upgrade) {
            connection.disconnect(DisconnectReason::ShuttingDown);
        }
    }
}

/// Server endpoint on a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryServer {
    network: MemoryNetwork,
    address: SocketAddr,
    guid: u64,
}

#[async_trait]
impl TransportServer for MemoryServer {
    async fn bind(&self, listener: Arc<dyn ServerListener>) -> Result<(), TransportError> {
        match self.network.endpoints.entry(self.address) {
            Entry::Occupied(_) => Err(TransportError::AddressInUse(self.address)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Endpoint {
                    listener,
                    connections: Mutex::new(Vec::new()),
                }));
                Ok(())
            }
        }
    }

    fn local_address(&self) -> SocketAddr {
        self.address
    }

    fn guid(&self) -> u64 {
        self.guid
    }

    async fn close(&self) {
        let Some((_, endpoint)) = self.network.endpoints.remove(&self.address) else {
            return;
        };
        let connections = std::mem::take(&mut *endpoint.connections.lock());
        for connection in connections.iter().filter_map(Weak::upgrade) {
            connection.disconnect(DisconnectReason::ShuttingDown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Acceptor {
        accept: bool,
        created: Mutex<Vec<Connection>>,
    }

    impl ServerListener for Acceptor {
        fn on_connection_request(&self, _address: SocketAddr, _real: SocketAddr) -> bool {
            self.accept
        }

        fn on_query(&self, _address: SocketAddr) -> Option<Bytes> {
            Some(Bytes::from_static(b"MCPE;memory;"))
        }

        fn on_session_creation(&self, connection: Connection) {
            self.created.lock().push(connection);
        }

        fn on_unhandled_datagram(&self, _address: SocketAddr, _payload: Bytes) {}
    }

    fn acceptor(accept: bool) -> Arc<Acceptor> {
        Arc::new(Acceptor {
            accept,
            created: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_connect_delivers_in_order() {
        let network = MemoryNetwork::new();
        let address: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        let server = network.server(address);
        let listener = acceptor(true);
        server.bind(listener.clone()).await.unwrap();

        let client = network.client();
        client.bind().await.unwrap();
        assert_eq!(&client.ping(address).await.unwrap()[..], b"MCPE;memory;");

        let mut connection = client.connect(address).await.unwrap();
        assert_eq!(
            connection.events.recv().await,
            Some(ConnectionEvent::StateChanged(ConnectionState::Connecting))
        );
        assert_eq!(
            connection.events.recv().await,
            Some(ConnectionEvent::StateChanged(ConnectionState::Connected))
        );

        connection.handle.send(Bytes::from_static(b"one"));
        connection.handle.send(Bytes::from_static(b"two"));
        connection.handle.disconnect(DisconnectReason::Disconnected);

        let mut accepted = listener.created.lock().pop().unwrap();
        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(accepted.events.recv().await.unwrap());
        }
        assert_eq!(
            received,
            vec![
                ConnectionEvent::StateChanged(ConnectionState::Connected),
                ConnectionEvent::Encapsulated(Bytes::from_static(b"one")),
                ConnectionEvent::Encapsulated(Bytes::from_static(b"two")),
                ConnectionEvent::Disconnected(DisconnectReason::ClosedByRemotePeer),
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        let network = MemoryNetwork::new();
        let address: SocketAddr = "127.0.0.1:19133".parse().unwrap();
        network.server(address).bind(acceptor(false)).await.unwrap();

        let client = network.client();
        client.bind().await.unwrap();
        let mut connection = client.connect(address).await.unwrap();
        connection.events.recv().await;
        assert_eq!(
            connection.events.recv().await,
            Some(ConnectionEvent::Disconnected(DisconnectReason::ConnectionRequestFailed))
        );
    }

    #[tokio::test]
    async fn test_requires_bind_and_unique_address() {
        let network = MemoryNetwork::new();
        let address: SocketAddr = "127.0.0.1:19134".parse().unwrap();
        let client = network.client();
        assert_eq!(
            client.connect(address).await.unwrap_err(),
            TransportError::NotBound
        );

        network.server(address).bind(acceptor(true)).await.unwrap();
        assert_eq!(
            network.server(address).bind(acceptor(true)).await.unwrap_err(),
            TransportError::AddressInUse(address)
        );
    }
}
