//! Batch encryption and integrity trailers.
//!
//! Encrypted batches carry an 8-byte trailer computed over a per-direction
//! counter, the compressed payload and the raw key. The payload and trailer
//! are then run through a stream cipher whose state carries across batches,
//! so both peers must process batches in the same order.

use crate::error::CryptoError;
use aes::cipher::inout::InOutBuf;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::Aes256;
use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Trailer size in bytes
pub const TRAILER_LEN: usize = 8;

/// AES-256 key size in bytes
pub const KEY_LEN: usize = 32;

/// Last protocol version that uses CFB8
pub const LAST_CFB8_PROTOCOL: u32 = 428;

const AES_ALGORITHM: &str = "AES";
const GCM_IV_LEN: usize = 12;
const GCM_COUNTER_START: [u8; 4] = [0, 0, 0, 2];
const CFB8_IV_LEN: usize = 16;

/// Symmetric key agreed during the handshake
#[derive(Clone)]
pub struct SecretKey {
    algorithm: String,
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Create a key for an algorithm name
    pub fn new(algorithm: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm: algorithm.into(),
            bytes: bytes.into(),
        }
    }

    /// Create an AES-256 key
    pub fn aes(bytes: [u8; KEY_LEN]) -> Self {
        Self::new(AES_ALGORITHM, bytes.to_vec())
    }

    /// Algorithm name
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn validate(&self) -> Result<(), CryptoError> {
        if !self.algorithm.eq_ignore_ascii_case(AES_ALGORITHM) {
            return Err(CryptoError::Algorithm(self.algorithm.clone()));
        }
        if self.bytes.len() != KEY_LEN {
            return Err(CryptoError::KeyLength(self.bytes.len()));
        }
        Ok(())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

/// Cipher mode selected by game protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// AES-256 in counter mode, keystream compatible with GCM
    Gcm,
    /// AES-256-CFB8
    Cfb8,
}

impl CipherMode {
    /// Mode used by a game protocol version
    pub fn for_protocol(protocol_version: u32) -> Self {
        if protocol_version > LAST_CFB8_PROTOCOL {
            Self::Gcm
        } else {
            Self::Cfb8
        }
    }
}

type Aes256Ctr = ctr::Ctr32BE<Aes256>;

/// One direction of a stream cipher
pub enum PacketCipher {
    /// GCM-compatible keystream
    Ctr(Box<Aes256Ctr>),
    /// CFB8 encryptor
    Cfb8Encrypt(Box<cfb8::Encryptor<Aes256>>),
    /// CFB8 decryptor
    Cfb8Decrypt(Box<cfb8::Decryptor<Aes256>>),
}

impl PacketCipher {
    fn encryptor(mode: CipherMode, key: &[u8]) -> Result<Self, CryptoError> {
        match mode {
            CipherMode::Gcm => Ok(Self::Ctr(Box::new(ctr_cipher(key)?))),
            CipherMode::Cfb8 => {
                let iv = &key[..CFB8_IV_LEN];
                let cipher = cfb8::Encryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::KeyLength(key.len()))?;
                Ok(Self::Cfb8Encrypt(Box::new(cipher)))
            }
        }
    }

    fn decryptor(mode: CipherMode, key: &[u8]) -> Result<Self, CryptoError> {
        match mode {
            CipherMode::Gcm => Ok(Self::Ctr(Box::new(ctr_cipher(key)?))),
            CipherMode::Cfb8 => {
                let iv = &key[..CFB8_IV_LEN];
                let cipher = cfb8::Decryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::KeyLength(key.len()))?;
                Ok(Self::Cfb8Decrypt(Box::new(cipher)))
            }
        }
    }

    /// Transform `data` in place, advancing the cipher state
    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Ctr(cipher) => cipher.apply_keystream(data),
            Self::Cfb8Encrypt(cipher) => {
                let (blocks, _) = InOutBuf::from(data).into_chunks();
                cipher.encrypt_blocks_inout_mut(blocks);
            }
            Self::Cfb8Decrypt(cipher) => {
                let (blocks, _) = InOutBuf::from(data).into_chunks();
                cipher.decrypt_blocks_inout_mut(blocks);
            }
        }
    }
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ctr(_) => "Ctr",
            Self::Cfb8Encrypt(_) => "Cfb8Encrypt",
            Self::Cfb8Decrypt(_) => "Cfb8Decrypt",
        };
        f.write_str(name)
    }
}

fn ctr_cipher(key: &[u8]) -> Result<Aes256Ctr, CryptoError> {
    let mut iv = [0u8; CFB8_IV_LEN];
    iv[..GCM_IV_LEN].copy_from_slice(&key[..GCM_IV_LEN]);
    iv[GCM_IV_LEN..].copy_from_slice(&GCM_COUNTER_START);
    Aes256Ctr::new_from_slices(key, &iv).map_err(|_| CryptoError::KeyLength(key.len()))
}

/// First [`TRAILER_LEN`] bytes of `SHA-256(counter LE ∥ payload ∥ key)`
pub fn compute_trailer(counter: u64, payload: &[u8], key: &[u8]) -> [u8; TRAILER_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(counter.to_le_bytes());
    hasher.update(payload);
    hasher.update(key);
    let digest = hasher.finalize();

    let mut trailer = [0u8; TRAILER_LEN];
    trailer.copy_from_slice(&digest[..TRAILER_LEN]);
    trailer
}

/// Cipher pair and counters for one session
#[derive(Debug)]
pub struct EncryptionState {
    key: SecretKey,
    mode: CipherMode,
    encryptor: PacketCipher,
    decryptor: PacketCipher,
    sent: u64,
    received: u64,
}

impl EncryptionState {
    /// Validate `key` and build both directions
    pub fn new(key: SecretKey, mode: CipherMode) -> Result<Self, CryptoError> {
        key.validate()?;
        let encryptor = PacketCipher::encryptor(mode, key.as_bytes())?;
        let decryptor = PacketCipher::decryptor(mode, key.as_bytes())?;
        Ok(Self {
            key,
            mode,
            encryptor,
            decryptor,
            sent: 0,
            received: 0,
        })
    }

    /// Active mode
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Encrypted batches sent so far
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Append the trailer and encrypt
    pub fn seal(&mut self, payload: &[u8]) -> Bytes {
        let trailer = compute_trailer(self.sent, payload, self.key.as_bytes());
        self.sent += 1;

        let mut out = BytesMut::with_capacity(payload.len() + TRAILER_LEN);
        out.put_slice(payload);
        out.put_slice(&trailer);
        self.encryptor.apply(&mut out);
        out.freeze()
    }

    /// Decrypt, strip and verify the trailer.
    ///
    /// The receive counter advances for every batch so a rejected batch does
    /// not shift the trailers of those after it.
    pub fn open(&mut self, data: &[u8]) -> Result<Bytes, CryptoError> {
        let mut buf = BytesMut::from(data);
        self.decryptor.apply(&mut buf);

        let counter = self.received;
        self.received += 1;

        if buf.len() < TRAILER_LEN {
            return Err(CryptoError::Truncated(buf.len()));
        }
        let trailer = buf.split_off(buf.len() - TRAILER_LEN);
        let expected = compute_trailer(counter, &buf, self.key.as_bytes());
        if trailer[..] != expected[..] {
            debug!("Trailer mismatch on batch {} ({} bytes)", counter, buf.len());
            return Err(CryptoError::TrailerMismatch(counter));
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        let mut bytes = [0u8; KEY_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8 * 7 + 3;
        }
        SecretKey::aes(bytes)
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(CipherMode::for_protocol(422), CipherMode::Cfb8);
        assert_eq!(CipherMode::for_protocol(428), CipherMode::Cfb8);
        assert_eq!(CipherMode::for_protocol(429), CipherMode::Gcm);
        assert_eq!(CipherMode::for_protocol(440), CipherMode::Gcm);
    }

    #[test]
    fn test_trailer_depends_on_counter() {
        let key = key();
        let payload = b"same payload";
        assert_ne!(
            compute_trailer(0, payload, key.as_bytes()),
            compute_trailer(1, payload, key.as_bytes())
        );
        assert_eq!(
            compute_trailer(5, payload, key.as_bytes()),
            compute_trailer(5, payload, key.as_bytes())
        );
    }

    #[test]
    fn test_loopback_both_modes() {
        for mode in [CipherMode::Gcm, CipherMode::Cfb8] {
            let mut sender = EncryptionState::new(key(), mode).unwrap();
            let mut receiver = EncryptionState::new(key(), mode).unwrap();

            for payload in [&b"first batch"[..], &b"second"[..], &[0u8; 300][..]] {
                let sealed = sender.seal(payload);
                assert_eq!(sealed.len(), payload.len() + TRAILER_LEN);
                assert_ne!(&sealed[..payload.len()], payload);
                assert_eq!(&receiver.open(&sealed).unwrap()[..], payload);
            }
            assert_eq!(sender.sent_count(), 3);
        }
    }

    #[test]
    fn test_tampered_batch_rejected() {
        let mut sender = EncryptionState::new(key(), CipherMode::Gcm).unwrap();
        let mut receiver = EncryptionState::new(key(), CipherMode::Gcm).unwrap();

        let mut sealed = sender.seal(b"payload").to_vec();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert_eq!(receiver.open(&sealed), Err(CryptoError::TrailerMismatch(0)));
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert_eq!(
            EncryptionState::new(SecretKey::new("DES", vec![0u8; 32]), CipherMode::Gcm).unwrap_err(),
            CryptoError::Algorithm("DES".to_string())
        );
        assert_eq!(
            EncryptionState::new(SecretKey::new("AES", vec![0u8; 16]), CipherMode::Cfb8).unwrap_err(),
            CryptoError::KeyLength(16)
        );
    }

    #[test]
    fn test_short_payload_truncated() {
        let mut receiver = EncryptionState::new(key(), CipherMode::Cfb8).unwrap();
        assert_eq!(receiver.open(&[1, 2, 3]), Err(CryptoError::Truncated(3)));
    }

    #[test]
    fn test_zeroized_key_is_unusable() {
        let mut key = key();
        key.zeroize();
        assert!(key.as_bytes().is_empty());
        assert_eq!(
            EncryptionState::new(key, CipherMode::Gcm).unwrap_err(),
            CryptoError::KeyLength(0)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(!format!("{:?}", key()).contains("3,"));
    }
}
