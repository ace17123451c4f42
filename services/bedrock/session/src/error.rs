//! Session and lifecycle error types.

use crate::transport::{DisconnectReason, TransportError};
use bedrock_wire::BatchError;
use std::net::SocketAddr;
use thiserror::Error;

/// Encryption setup and payload integrity errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is not an AES key
    #[error("invalid key algorithm: {0}")]
    Algorithm(String),

    /// Key has the wrong size
    #[error("invalid key length: {0} bytes")]
    KeyLength(usize),

    /// Encrypted payload is shorter than its trailer
    #[error("encrypted payload too short: {0} bytes")]
    Truncated(usize),

    /// Trailer does not match the decrypted payload
    #[error("trailer mismatch on encrypted packet {0}")]
    TrailerMismatch(u64),
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation on a closed session
    #[error("session has been closed")]
    Closed,

    /// Second call to enable encryption
    #[error("encryption is already enabled")]
    EncryptionAlreadyEnabled,

    /// Packet type missing from the active packet table
    #[error("packet {0} is not registered in the active packet table")]
    UnregisteredPacket(&'static str),

    /// Cipher failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Batch could not be built
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),
}

/// Client connect and ping errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport disconnected before the connection was established
    #[error("connection failed: {0}")]
    ConnectionFailed(DisconnectReason),

    /// No status reply in time
    #[error("ping to {0} timed out")]
    PingTimeout(SocketAddr),

    /// Connection did not complete in time
    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    /// Transport refused the operation
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
