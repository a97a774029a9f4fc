use crate::error::{PullError, Result};
use std::fmt;

/// Size of the stream key (and of every ratcheted subkey)
pub const KEY_SIZE: usize = 32;

/// Size of the per-stream header
pub const HEADER_SIZE: usize = 24;

/// Size of the Poly1305 authenticator appended to every chunk
pub const MAC_SIZE: usize = 16;

/// Per-chunk overhead: 1 encrypted tag byte + MAC
pub const ABYTES: usize = 1 + MAC_SIZE;

/// Internal ChaCha20 nonce: counter (4 bytes, little-endian) || inonce (8 bytes)
pub(crate) const NONCE_SIZE: usize = 12;
pub(crate) const COUNTER_SIZE: usize = 4;
pub(crate) const INONCE_SIZE: usize = 8;

/// Plaintext size of each chunk in the common fixed-size container layout
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Role of a chunk in the stream, bound into that chunk's authenticator
///
/// Byte values match libsodium's `crypto_secretstream_xchacha20poly1305_TAG_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Ordinary chunk
    Message,
    /// End of a logical message inside the stream
    Push,
    /// Ratchet the subkey after this chunk
    Rekey,
    /// Last chunk of the stream
    Final,
}

impl TagKind {
    const MESSAGE: u8 = 0x00;
    const PUSH: u8 = 0x01;
    const REKEY: u8 = 0x02;
    const FINAL: u8 = Self::PUSH | Self::REKEY;

    /// Map a decrypted tag byte to its kind, `None` for unassigned values
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::MESSAGE => Some(TagKind::Message),
            Self::PUSH => Some(TagKind::Push),
            Self::REKEY => Some(TagKind::Rekey),
            Self::FINAL => Some(TagKind::Final),
            _ => None,
        }
    }

    /// Wire byte for this tag
    pub fn as_byte(self) -> u8 {
        match self {
            TagKind::Message => Self::MESSAGE,
            TagKind::Push => Self::PUSH,
            TagKind::Rekey => Self::REKEY,
            TagKind::Final => Self::FINAL,
        }
    }

    /// Whether accepting this chunk ratchets the subkey. FINAL carries the
    /// REKEY bit as well.
    pub(crate) fn ratchets(self) -> bool {
        self.as_byte() & Self::REKEY != 0
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagKind::Message => "MESSAGE",
            TagKind::Push => "PUSH",
            TagKind::Rekey => "REKEY",
            TagKind::Final => "FINAL",
        };
        f.write_str(name)
    }
}

/// Per-stream header (24 bytes)
///
/// Layout:
/// - key_nonce: [u8; 16] (HChaCha20 input, derives the first subkey)
/// - inonce: [u8; 8] (initial nonce suffix)
///
/// Not secret, but must never be reused with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    bytes: [u8; HEADER_SIZE],
}

impl StreamHeader {
    /// Wrap header bytes read from a trusted fixed-size source
    pub fn new(bytes: [u8; HEADER_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse a header, rejecting anything that is not exactly 24 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; HEADER_SIZE] = bytes.try_into().map_err(|_| {
            PullError::InvalidKeyMaterial(format!(
                "stream header must be {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Raw header bytes, as stored alongside the stream
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.bytes
    }

    pub(crate) fn key_nonce(&self) -> &[u8] {
        &self.bytes[..HEADER_SIZE - INONCE_SIZE]
    }

    pub(crate) fn inonce(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE - INONCE_SIZE..]
    }
}

/// Plaintext length carried by an encrypted chunk of `chunk_len` bytes,
/// or `None` if the chunk is too short to be well formed
pub fn plaintext_len(chunk_len: usize) -> Option<usize> {
    chunk_len.checked_sub(ABYTES)
}
