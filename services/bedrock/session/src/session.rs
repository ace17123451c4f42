//! Core session for one Bedrock connection.
//!
//! A session owns the outbound packet queue, the active packet table, the
//! batch format chosen at construction and the optional cipher pair. It is
//! driven by one task (see [`crate::lifecycle`]) that flushes the queue on
//! every tick and feeds received payloads through [`BedrockSession::receive`].

use crate::crypto::{CipherMode, EncryptionState, SecretKey};
use crate::error::SessionError;
use crate::handler::{BatchHandler, DefaultBatchHandler};
use crate::transport::{DisconnectReason, TransportConnection};
use bedrock_wire::packet::DisconnectPacket;
use bedrock_wire::{
    Packet, PacketCodec, PacketHandler, WrapperSerializer, BATCH_MARKER, DEFAULT_COMPRESSION_LEVEL,
};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, trace};

/// Kick message used when no reason is given
pub const DEFAULT_DISCONNECT_MESSAGE: &str = "disconnect.disconnected";

/// Configuration for Bedrock sessions and their lifecycle
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Interval between queue flushes
    pub tick_interval: Duration,
    /// How long to wait for a status reply
    pub ping_timeout: Duration,
    /// How long a client connect may take
    pub connect_timeout: Duration,
    /// Compression level for outbound batches
    pub compression_level: u32,
    /// Trace-log every outbound packet
    pub log_packets: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            ping_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            log_packets: false,
        }
    }
}

/// How a session tells its peer it is leaving
pub trait SessionRole: Send + Sync + fmt::Debug {
    /// Notify the peer, then close the transport connection
    fn disconnect(&self, session: &BedrockSession, reason: Option<&str>, hide_reason: bool);
}

/// Server side: sends a disconnect packet carrying the reason first
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerRole;

impl SessionRole for ServerRole {
    fn disconnect(&self, session: &BedrockSession, reason: Option<&str>, hide_reason: bool) {
        let packet = DisconnectPacket {
            message_skipped: hide_reason,
            kick_message: reason.unwrap_or(DEFAULT_DISCONNECT_MESSAGE).to_string(),
        };
        if let Err(e) = session.send_immediately(packet) {
            debug!("Could not notify {} of disconnect: {}", session.address(), e);
        }
        session.connection().disconnect(DisconnectReason::Disconnected);
    }
}

/// Client side: closes the transport connection
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientRole;

impl SessionRole for ClientRole {
    fn disconnect(&self, session: &BedrockSession, _reason: Option<&str>, _hide_reason: bool) {
        session.connection().disconnect(DisconnectReason::Disconnected);
    }
}

type DisconnectHandler = Box<dyn FnOnce(DisconnectReason) + Send>;

/// One Bedrock connection
pub struct BedrockSession {
    connection: Arc<dyn TransportConnection>,
    wrapper: &'static dyn WrapperSerializer,
    role: Box<dyn SessionRole>,
    codec: RwLock<Arc<PacketCodec>>,
    queue_tx: mpsc::UnboundedSender<Packet>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Packet>>,
    encryption: Mutex<Option<EncryptionState>>,
    batch_handler: RwLock<Arc<dyn BatchHandler>>,
    packet_handler: Mutex<Option<Box<dyn PacketHandler>>>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    compression_level: AtomicU32,
    closed: AtomicBool,
    logging: AtomicBool,
    hardcoded_blocking_id: AtomicI32,
    pub(crate) tick: Notify,
}

impl BedrockSession {
    /// Create a session over an established connection
    pub fn new(
        connection: Arc<dyn TransportConnection>,
        wrapper: &'static dyn WrapperSerializer,
        codec: Arc<PacketCodec>,
        role: Box<dyn SessionRole>,
        config: &SessionConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            connection,
            wrapper,
            role,
            codec: RwLock::new(codec),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            encryption: Mutex::new(None),
            batch_handler: RwLock::new(Arc::new(DefaultBatchHandler)),
            packet_handler: Mutex::new(None),
            disconnect_handlers: Mutex::new(Vec::new()),
            compression_level: AtomicU32::new(config.compression_level),
            closed: AtomicBool::new(false),
            logging: AtomicBool::new(config.log_packets),
            hardcoded_blocking_id: AtomicI32::new(-1),
            tick: Notify::new(),
        }
    }

    /// Create a server-side session
    pub fn server(
        connection: Arc<dyn TransportConnection>,
        wrapper: &'static dyn WrapperSerializer,
        codec: Arc<PacketCodec>,
        config: &SessionConfig,
    ) -> Self {
        Self::new(connection, wrapper, codec, Box::new(ServerRole), config)
    }

    /// Create a client-side session
    pub fn client(
        connection: Arc<dyn TransportConnection>,
        wrapper: &'static dyn WrapperSerializer,
        codec: Arc<PacketCodec>,
        config: &SessionConfig,
    ) -> Self {
        Self::new(connection, wrapper, codec, Box::new(ClientRole), config)
    }

    /// Queue a packet for the next tick
    pub fn send(&self, packet: impl Into<Packet>) -> Result<(), SessionError> {
        let packet = packet.into();
        self.check_sendable(&packet)?;
        self.queue_tx.send(packet).map_err(|_| SessionError::Closed)
    }

    /// Serialize, encrypt and send a packet on the calling task
    pub fn send_immediately(&self, packet: impl Into<Packet>) -> Result<(), SessionError> {
        let packet = packet.into();
        self.check_sendable(&packet)?;
        let encrypt = packet.is_encryptable();
        self.send_wrapped(std::slice::from_ref(&packet), encrypt)
    }

    fn check_sendable(&self, packet: &Packet) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if !self.codec.read().is_registered(packet) {
            return Err(SessionError::UnregisteredPacket(packet.kind().name()));
        }
        Ok(())
    }

    /// Drain the outbound queue.
    ///
    /// Encryptable packets accumulate into one batch. An unencryptable packet
    /// flushes what has accumulated and then goes out alone in clear text.
    pub fn flush(&self) {
        let mut queue = self.queue_rx.lock();
        let mut batch = Vec::new();

        while let Ok(packet) = queue.try_recv() {
            if packet.is_encryptable() {
                batch.push(packet);
                continue;
            }
            self.flush_batch(&mut batch);
            if let Err(e) = self.send_wrapped(std::slice::from_ref(&packet), false) {
                error!("Failed to send {} to {}: {}", packet.kind().name(), self.address(), e);
            }
        }

        self.flush_batch(&mut batch);
    }

    fn flush_batch(&self, batch: &mut Vec<Packet>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.send_wrapped(batch, true) {
            error!(
                "Failed to send batch of {} packets to {}: {}",
                batch.len(),
                self.address(),
                e
            );
        }
        batch.clear();
    }

    fn send_wrapped(&self, packets: &[Packet], encrypt: bool) -> Result<(), SessionError> {
        let codec = self.packet_codec();
        if self.logging.load(Ordering::Relaxed) {
            for packet in packets {
                trace!("Outbound to {}: {:?}", self.address(), packet);
            }
        }

        let compressed = self
            .wrapper
            .serialize(&codec, packets, self.compression_level())?;

        // The cipher lock is held until the payload is handed to the transport
        // so encrypted batches leave in counter order.
        let mut encryption = self.encryption.lock();
        let body = match encryption.as_mut() {
            Some(state) if encrypt => state.seal(&compressed),
            _ => compressed,
        };

        let mut payload = BytesMut::with_capacity(body.len() + 1);
        payload.put_u8(BATCH_MARKER);
        payload.put_slice(&body);
        self.connection.send(payload.freeze());
        Ok(())
    }

    /// Process a received batch payload, without its leading marker byte.
    ///
    /// A payload that fails to decrypt or decode is dropped and the error
    /// returned; the session stays usable.
    pub fn receive(&self, payload: &[u8]) -> Result<(), SessionError> {
        let compressed = match self.encryption.lock().as_mut() {
            Some(state) => state.open(payload)?,
            None => Bytes::copy_from_slice(payload),
        };

        if compressed.is_empty() {
            return Ok(());
        }

        let codec = self.packet_codec();
        let packets = self.wrapper.deserialize(&codec, &compressed)?;

        let handler = self.batch_handler();
        handler.handle(self, &compressed, packets);
        Ok(())
    }

    /// Dispatch one packet to the packet handler; false if unhandled
    pub fn dispatch(&self, packet: &Packet) -> bool {
        let taken = self.packet_handler.lock().take();
        let Some(mut handler) = taken else {
            return false;
        };

        let handled = packet.handle(handler.as_mut());

        // A handler installed during dispatch wins
        let mut slot = self.packet_handler.lock();
        if slot.is_none() {
            *slot = Some(handler);
        }
        handled
    }

    /// Turn on batch encryption; allowed once per session
    pub fn enable_encryption(&self, key: SecretKey) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut encryption = self.encryption.lock();
        if encryption.is_some() {
            return Err(SessionError::EncryptionAlreadyEnabled);
        }

        let mode = CipherMode::for_protocol(self.packet_codec().protocol_version());
        *encryption = Some(EncryptionState::new(key, mode)?);
        debug!("Enabled {:?} encryption for {}", mode, self.address());
        Ok(())
    }

    /// Whether batches are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.encryption.lock().is_some()
    }

    /// Disconnect with the default reason
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.disconnect_with_reason(None, false)
    }

    /// Disconnect, telling the peer `reason` unless hidden
    pub fn disconnect_with_reason(
        &self,
        reason: Option<&str>,
        hide_reason: bool,
    ) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.role.disconnect(self, reason, hide_reason);
        self.close(DisconnectReason::Disconnected);
        Ok(())
    }

    /// Mark closed, wipe the cipher and fire disconnect handlers once
    pub(crate) fn close(&self, reason: DisconnectReason) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.encryption.lock().take();
        let handlers = std::mem::take(&mut *self.disconnect_handlers.lock());
        for handler in handlers {
            handler(reason);
        }
        debug!("Session {} closed: {}", self.address(), reason);
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `handler` when the session closes.
    ///
    /// Handlers added after close never run.
    pub fn add_disconnect_handler<F>(&self, handler: F)
    where
        F: FnOnce(DisconnectReason) + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        self.disconnect_handlers.lock().push(Box::new(handler));
    }

    /// Underlying transport connection
    pub fn connection(&self) -> &Arc<dyn TransportConnection> {
        &self.connection
    }

    /// Batch format of this session
    pub fn wrapper(&self) -> &'static dyn WrapperSerializer {
        self.wrapper
    }

    /// Peer address
    pub fn address(&self) -> SocketAddr {
        self.connection.address()
    }

    /// Peer address before any proxy rewrite
    pub fn real_address(&self) -> SocketAddr {
        self.connection.real_address()
    }

    /// Transport round-trip time
    pub fn latency(&self) -> Duration {
        self.connection.ping()
    }

    /// Active packet table
    pub fn packet_codec(&self) -> Arc<PacketCodec> {
        Arc::clone(&self.codec.read())
    }

    /// Swap the packet table, e.g. after version negotiation
    pub fn set_packet_codec(&self, codec: Arc<PacketCodec>) {
        *self.codec.write() = codec;
    }

    /// Post-decode hook
    pub fn batch_handler(&self) -> Arc<dyn BatchHandler> {
        Arc::clone(&self.batch_handler.read())
    }

    /// Replace the post-decode hook
    pub fn set_batch_handler(&self, handler: Arc<dyn BatchHandler>) {
        *self.batch_handler.write() = handler;
    }

    /// Replace the packet handler
    pub fn set_packet_handler(&self, handler: Box<dyn PacketHandler>) {
        *self.packet_handler.lock() = Some(handler);
    }

    /// Compression level for outbound batches
    pub fn compression_level(&self) -> u32 {
        self.compression_level.load(Ordering::Relaxed)
    }

    /// Set the compression level for outbound batches
    pub fn set_compression_level(&self, level: u32) {
        self.compression_level.store(level, Ordering::Relaxed);
    }

    /// Trace-log outbound packets
    pub fn set_logging(&self, enabled: bool) {
        self.logging.store(enabled, Ordering::Relaxed);
    }

    /// Whether outbound packets are trace-logged
    pub fn is_logging(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    /// Advisory item runtime ID for shield blocking, -1 if unset
    pub fn hardcoded_blocking_id(&self) -> i32 {
        self.hardcoded_blocking_id.load(Ordering::Relaxed)
    }

    /// Set the advisory blocking item ID
    pub fn set_hardcoded_blocking_id(&self, id: i32) {
        self.hardcoded_blocking_id.store(id, Ordering::Relaxed);
    }

    /// Ask the driver task to flush on its next turn
    pub(crate) fn request_flush(&self) {
        self.tick.notify_one();
    }
}

impl fmt::Debug for BedrockSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockSession")
            .field("address", &self.address())
            .field("wrapper", &self.wrapper.version())
            .field("protocol", &self.codec.read().protocol_version())
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::error::CryptoError;
    use crate::memory::MemoryConnection;
    use bedrock_wire::packet::{
        AddBehaviorTreePacket, PlayStatus, PlayStatusPacket, ServerToClientHandshakePacket,
    };
    use bedrock_wire::{codec_for_protocol, wrapper_for_version, PacketKind};
    use std::sync::atomic::AtomicUsize;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn codec(version: u32) -> Arc<PacketCodec> {
        codec_for_protocol(version).unwrap().unwrap()
    }

    fn server_pair(version: u32) -> (Arc<MemoryConnection>, BedrockSession, BedrockSession) {
        let (left, left_conn, _right, right_conn) = MemoryConnection::pair(addr(19132), addr(40000), 10);
        let config = SessionConfig::default();
        let server = BedrockSession::server(left_conn.handle, wrapper_for_version(10), codec(version), &config);
        let client = BedrockSession::client(right_conn.handle, wrapper_for_version(10), codec(version), &config);
        (left, server, client)
    }

    #[derive(Default)]
    struct Recorder {
        kinds: Arc<Mutex<Vec<PacketKind>>>,
    }

    impl PacketHandler for Recorder {
        fn handle_play_status(&mut self, _packet: &PlayStatusPacket) -> bool {
            self.kinds.lock().push(PacketKind::PlayStatus);
            true
        }

        fn handle_server_to_client_handshake(&mut self, _packet: &ServerToClientHandshakePacket) -> bool {
            self.kinds.lock().push(PacketKind::ServerToClientHandshake);
            true
        }

        fn handle_disconnect(&mut self, _packet: &DisconnectPacket) -> bool {
            self.kinds.lock().push(PacketKind::Disconnect);
            true
        }
    }

    #[test]
    fn test_unencryptable_packet_splits_batch() {
        let (sent, server, client) = server_pair(440);
        server.enable_encryption(SecretKey::aes(KEY)).unwrap();
        client.enable_encryption(SecretKey::aes(KEY)).unwrap();

        server.send(PlayStatusPacket::new(PlayStatus::LoginSuccess)).unwrap();
        server.send(ServerToClientHandshakePacket { jwt: "token".to_string() }).unwrap();
        server.send(DisconnectPacket::with_message("bye")).unwrap();
        server.flush();

        let payloads = sent.sent_payloads();
        assert_eq!(payloads.len(), 3);
        assert!(payloads.iter().all(|p| p[0] == BATCH_MARKER));

        let wrapper = wrapper_for_version(10);
        let codec = codec(440);
        // Clear-text batch decodes without the cipher
        let plain = wrapper.deserialize(&codec, &payloads[1][1..]).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].kind(), PacketKind::ServerToClientHandshake);

        let recorder = Recorder::default();
        let kinds = Arc::clone(&recorder.kinds);
        client.set_packet_handler(Box::new(recorder));
        client.receive(&payloads[0][1..]).unwrap();
        client.receive(&payloads[2][1..]).unwrap();
        assert_eq!(*kinds.lock(), vec![PacketKind::PlayStatus, PacketKind::Disconnect]);
    }

    #[test]
    fn test_enable_encryption_twice_fails() {
        let (sent, server, client) = server_pair(440);
        server.enable_encryption(SecretKey::aes(KEY)).unwrap();
        assert!(matches!(
            server.enable_encryption(SecretKey::aes([0x11; KEY_LEN])),
            Err(SessionError::EncryptionAlreadyEnabled)
        ));
        assert!(server.is_encrypted());

        // The first key is still the one in use
        client.enable_encryption(SecretKey::aes(KEY)).unwrap();
        let recorder = Recorder::default();
        let kinds = Arc::clone(&recorder.kinds);
        client.set_packet_handler(Box::new(recorder));

        server.send_immediately(PlayStatusPacket::new(PlayStatus::LoginSuccess)).unwrap();
        client.receive(&sent.sent_payloads()[0][1..]).unwrap();
        assert_eq!(*kinds.lock(), vec![PacketKind::PlayStatus]);
    }

    #[test]
    fn test_tampered_batch_dropped_session_survives() {
        let (sent, server, client) = server_pair(440);
        server.enable_encryption(SecretKey::aes(KEY)).unwrap();
        client.enable_encryption(SecretKey::aes(KEY)).unwrap();
        let recorder = Recorder::default();
        let kinds = Arc::clone(&recorder.kinds);
        client.set_packet_handler(Box::new(recorder));

        server.send_immediately(PlayStatusPacket::new(PlayStatus::LoginSuccess)).unwrap();
        server.send_immediately(DisconnectPacket::hidden()).unwrap();
        let payloads = sent.sent_payloads();

        let mut tampered = payloads[0][1..].to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        assert!(matches!(
            client.receive(&tampered),
            Err(SessionError::Crypto(CryptoError::TrailerMismatch(0)))
        ));
        assert!(kinds.lock().is_empty());
        assert!(!client.is_closed());

        // Counter-mode keystream is independent of the corrupted byte
        client.receive(&payloads[1][1..]).unwrap();
        assert_eq!(*kinds.lock(), vec![PacketKind::Disconnect]);
    }

    #[test]
    fn test_repeated_batch_sealed_with_send_counter() {
        let (sent, server, client) = server_pair(440);
        server.enable_encryption(SecretKey::aes(KEY)).unwrap();
        client.enable_encryption(SecretKey::aes(KEY)).unwrap();
        let recorder = Recorder::default();
        let kinds = Arc::clone(&recorder.kinds);
        client.set_packet_handler(Box::new(recorder));

        for _ in 0..2 {
            server.send(PlayStatusPacket::new(PlayStatus::LoginSuccess)).unwrap();
            server.flush();
        }

        let payloads = sent.sent_payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].len(), payloads[1].len());
        assert_ne!(payloads[0], payloads[1]);

        client.receive(&payloads[0][1..]).unwrap();
        client.receive(&payloads[1][1..]).unwrap();
        assert_eq!(*kinds.lock(), vec![PacketKind::PlayStatus, PacketKind::PlayStatus]);

        // A replayed batch no longer matches the receive counter
        assert!(matches!(
            client.receive(&payloads[0][1..]),
            Err(SessionError::Crypto(CryptoError::TrailerMismatch(2)))
        ));
        assert_eq!(kinds.lock().len(), 2);
        assert!(!client.is_closed());
    }

    #[test]
    fn test_unregistered_packet_rejected() {
        let (_sent, server, _client) = server_pair(440);
        assert!(matches!(
            server.send(AddBehaviorTreePacket::default()),
            Err(SessionError::UnregisteredPacket(_))
        ));
        assert!(server.send(AddBehaviorTreePacket::default()).is_err());

        server.set_packet_codec(codec(422));
        assert!(server.send(AddBehaviorTreePacket::default()).is_ok());
    }

    #[test]
    fn test_close_fires_handlers_once() {
        let (_sent, server, _client) = server_pair(422);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        server.add_disconnect_handler(move |reason| {
            assert_eq!(reason, DisconnectReason::ClosedByRemotePeer);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        server.close(DisconnectReason::ClosedByRemotePeer);
        server.close(DisconnectReason::TimedOut);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!server.is_encrypted());

        assert!(matches!(
            server.send(PlayStatusPacket::new(PlayStatus::LoginSuccess)),
            Err(SessionError::Closed)
        ));
        assert!(matches!(server.disconnect(), Err(SessionError::Closed)));
        assert!(matches!(
            server.enable_encryption(SecretKey::aes(KEY)),
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_server_disconnect_sends_reason() {
        let (sent, server, client) = server_pair(422);
        let recorder = Recorder::default();
        let kinds = Arc::clone(&recorder.kinds);
        client.set_packet_handler(Box::new(recorder));

        server.disconnect_with_reason(Some("kicked"), false).unwrap();
        assert!(server.is_closed());

        let payloads = sent.sent_payloads();
        assert_eq!(payloads.len(), 1);
        let packets = server.wrapper().deserialize(&codec(422), &payloads[0][1..]).unwrap();
        let disconnect = packets[0].downcast_ref::<DisconnectPacket>().unwrap();
        assert_eq!(disconnect.kick_message, "kicked");
        assert!(!disconnect.message_skipped);

        client.receive(&payloads[0][1..]).unwrap();
        assert_eq!(*kinds.lock(), vec![PacketKind::Disconnect]);
    }
}
