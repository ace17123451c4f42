//! Session and connection lifecycle for the Bedrock protocol.
//!
//! This crate sits between a reliable-datagram transport and the game logic:
//! it queues outbound packets, flushes them as compressed batches on a fixed
//! tick, encrypts batches once a key has been agreed, and decodes inbound
//! batches into packets for a handler.
//!
//! ## Features
//!
//! - **Tick Flushing**: Packets queue without blocking and leave in order every 50 ms
//! - **Batch Encryption**: AES-256 stream ciphers with a SHA-256 integrity trailer
//! - **Clear-Text Exceptions**: Unencryptable packets split the batch and travel alone
//! - **Client & Server**: One session per client, a concurrent live set per server
//! - **Pluggable Transport**: Trait-based transport with an in-memory implementation
//!
//! ## Encrypted Batch
//!
//! ```text
//! +------+-------------------------------------------------+
//! | 0xFE | cipher( compressed batch ∥ trailer )             |
//! +------+-------------------------------------------------+
//! trailer = SHA-256( counter LE u64 ∥ compressed batch ∥ key )[0..8]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod memory;
pub mod server;
pub mod session;
pub mod transport;

// Re-export main types
pub use client::BedrockClient;
pub use crypto::{compute_trailer, CipherMode, EncryptionState, SecretKey, TRAILER_LEN};
pub use error::{ClientError, CryptoError, SessionError};
pub use handler::{BatchHandler, BedrockServerEventHandler, DefaultBatchHandler};
pub use lifecycle::{spawn_driver, spawn_ticker, SessionListener};
pub use memory::{MemoryClient, MemoryConnection, MemoryNetwork, MemoryServer};
pub use server::BedrockServer;
pub use session::{
    BedrockSession, ClientRole, ServerRole, SessionConfig, SessionRole, DEFAULT_DISCONNECT_MESSAGE,
};
pub use transport::{
    Connection, ConnectionEvent, ConnectionState, DisconnectReason, ServerListener,
    TransportClient, TransportConnection, TransportError, TransportServer,
};
