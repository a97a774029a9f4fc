//! Pull side of the XChaCha20-Poly1305 secretstream construction
//!
//! Bit-compatible with libsodium's `crypto_secretstream_xchacha20poly1305`.
//!
//! State: a 32-byte subkey plus a 12-byte ChaCha20 nonce laid out as
//! `counter (u32 LE) || inonce (8 bytes)`.
//!
//! Per chunk (`E(tag) || E(message) || mac`):
//! - keystream block 0 keys Poly1305
//! - keystream block 1 decrypts the tag byte
//! - keystream from block 2 decrypts the message
//! - the MAC covers `ad`, the encrypted tag block and the ciphertext
//!
//! After a verified chunk the first 8 MAC bytes are XORed into `inonce`
//! and the counter is incremented. REKEY (and FINAL, which carries the
//! REKEY bit) or a counter wrap ratchets the subkey forward.

use crate::error::{PullError, Result};
use crate::format::{
    plaintext_len, StreamHeader, TagKind, ABYTES, COUNTER_SIZE, INONCE_SIZE, KEY_SIZE, MAC_SIZE,
    NONCE_SIZE,
};
use crate::secret::{DerivedKey, SecretArray};
use chacha20::cipher::consts::U10;
use chacha20::cipher::generic_array::GenericArray;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, trace, warn};
use zeroize::Zeroize;

const BLOCK_SIZE: usize = 64;
const POLY_BLOCK_SIZE: usize = 16;

/// Lifecycle of a [`PullStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Ready for the next chunk
    Streaming,
    /// A FINAL chunk was accepted; nothing further is accepted
    Finalized,
    /// A chunk failed authentication; the stream is abandoned
    Failed,
}

/// Stateful decryptor for one stream
///
/// Chunks must be pulled strictly in order: each chunk authenticates
/// against the nonce and subkey left behind by its predecessor. Not meant
/// to be shared across threads without external locking.
pub struct PullStream {
    key: SecretArray<KEY_SIZE>,
    nonce: [u8; NONCE_SIZE],
    state: StreamState,
    chunks: u64,
}

impl PullStream {
    /// Build an engine from raw key and header bytes
    ///
    /// Fails with `InvalidKeyMaterial` unless the key is 32 bytes and the
    /// header 24 bytes.
    pub fn new(key: &[u8], header: &[u8]) -> Result<Self> {
        let key = DerivedKey::from_slice(key)?;
        let header = StreamHeader::from_bytes(header)?;
        Ok(Self::init(&key, &header))
    }

    /// Build an engine from an already-typed key and header
    pub fn init(key: &DerivedKey, header: &StreamHeader) -> Self {
        let mut subkey = SecretArray::zero();
        key.expose(|k| {
            let mut derived = chacha20::hchacha::<U10>(
                chacha20::Key::from_slice(k),
                GenericArray::from_slice(header.key_nonce()),
            );
            subkey.expose_mut(|out| out.copy_from_slice(&derived));
            derived.as_mut_slice().zeroize();
        });

        let mut nonce = [0u8; NONCE_SIZE];
        nonce[COUNTER_SIZE..].copy_from_slice(header.inonce());

        let mut stream = Self {
            key: subkey,
            nonce,
            state: StreamState::Streaming,
            chunks: 0,
        };
        stream.reset_counter();

        debug!("initialized pull stream");
        stream
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// True once a FINAL chunk has been accepted
    pub fn is_finalized(&self) -> bool {
        self.state == StreamState::Finalized
    }

    /// Number of chunks accepted so far
    pub fn chunks_pulled(&self) -> u64 {
        self.chunks
    }

    /// Authenticate and decrypt the next chunk
    pub fn pull(&mut self, chunk: &[u8]) -> Result<(Vec<u8>, TagKind)> {
        self.pull_with_ad(chunk, &[])
    }

    /// Authenticate and decrypt the next chunk, also binding `ad`
    ///
    /// `ad` must equal what the producer supplied for this chunk.
    /// On any failure the engine moves to [`StreamState::Failed`] and no
    /// plaintext is returned.
    pub fn pull_with_ad(&mut self, chunk: &[u8], ad: &[u8]) -> Result<(Vec<u8>, TagKind)> {
        self.ensure_streaming()?;

        let mlen = match plaintext_len(chunk.len()) {
            Some(mlen) => mlen,
            None => {
                return Err(self.fail(format!(
                    "chunk of {} bytes is shorter than the {}-byte overhead",
                    chunk.len(),
                    ABYTES
                )))
            }
        };
        let (body, stored_mac) = chunk.split_at(1 + mlen);
        let encrypted_tag = body[0];
        let ciphertext = &body[1..];

        let mut cipher = self.cipher();

        // Block 0: Poly1305 key
        let mut block = [0u8; BLOCK_SIZE];
        cipher.apply_keystream(&mut block);
        let mut poly = Poly1305::new(poly1305::Key::from_slice(&block[..KEY_SIZE]));
        block.zeroize();

        poly.update_padded(ad);

        // Block 1: tag byte
        block[0] = encrypted_tag;
        cipher.apply_keystream(&mut block);
        let tag_byte = block[0];
        block[0] = encrypted_tag;
        poly.update_padded(&block);
        block.zeroize();

        let mut mac = compute_mac(poly, ciphertext, ad.len());
        if !bool::from(mac.as_slice().ct_eq(stored_mac)) {
            mac.zeroize();
            return Err(self.fail(format!("chunk {} did not verify", self.chunks)));
        }

        // Blocks 2..: message
        let mut plaintext = ciphertext.to_vec();
        cipher.apply_keystream(&mut plaintext);

        let tag = match TagKind::from_byte(tag_byte) {
            Some(tag) => tag,
            None => {
                plaintext.zeroize();
                mac.zeroize();
                return Err(self.fail(format!(
                    "chunk {} carries unknown tag {:#04x}",
                    self.chunks, tag_byte
                )));
            }
        };

        self.advance(&mac, tag.ratchets());
        mac.zeroize();

        trace!(chunk = self.chunks, len = plaintext.len(), %tag, "pulled chunk");
        self.chunks += 1;

        if tag == TagKind::Final {
            self.state = StreamState::Finalized;
            debug!(chunks = self.chunks, "stream finalized");
        }

        Ok((plaintext, tag))
    }

    /// Ratchet the subkey without consuming a chunk
    ///
    /// Mirrors an explicit `rekey` on the producer side; both ends must do
    /// it at the same position in the stream.
    pub fn rekey(&mut self) -> Result<()> {
        self.ensure_streaming()?;
        self.ratchet();
        Ok(())
    }

    fn ensure_streaming(&self) -> Result<()> {
        match self.state {
            StreamState::Streaming => Ok(()),
            StreamState::Finalized => Err(PullError::StreamAlreadyFinalized),
            StreamState::Failed => Err(PullError::AuthenticationFailed(
                "stream was abandoned after an earlier failure".to_string(),
            )),
        }
    }

    fn fail(&mut self, reason: String) -> PullError {
        warn!(chunk = self.chunks, "chunk authentication failed, abandoning stream");
        self.state = StreamState::Failed;
        PullError::AuthenticationFailed(reason)
    }

    pub(crate) fn cipher(&self) -> ChaCha20 {
        self.key.expose(|k| {
            ChaCha20::new(
                chacha20::Key::from_slice(k),
                chacha20::Nonce::from_slice(&self.nonce),
            )
        })
    }

    pub(crate) fn advance(&mut self, mac: &[u8; MAC_SIZE], ratchet: bool) {
        for (n, m) in self.nonce[COUNTER_SIZE..].iter_mut().zip(&mac[..INONCE_SIZE]) {
            *n ^= m;
        }

        let counter = self.counter().wrapping_add(1);
        self.nonce[..COUNTER_SIZE].copy_from_slice(&counter.to_le_bytes());

        if ratchet || counter == 0 {
            self.ratchet();
        }
    }

    /// `(subkey || inonce) ^= ChaCha20(subkey, nonce)`, then counter = 1
    pub(crate) fn ratchet(&mut self) {
        let mut cipher = self.cipher();

        let mut material = [0u8; KEY_SIZE + INONCE_SIZE];
        self.key.expose(|k| material[..KEY_SIZE].copy_from_slice(k));
        material[KEY_SIZE..].copy_from_slice(&self.nonce[COUNTER_SIZE..]);

        cipher.apply_keystream(&mut material);

        self.key.expose_mut(|k| k.copy_from_slice(&material[..KEY_SIZE]));
        self.nonce[COUNTER_SIZE..].copy_from_slice(&material[KEY_SIZE..]);
        material.zeroize();

        self.reset_counter();
        debug!(chunk = self.chunks, "ratcheted stream subkey");
    }

    fn counter(&self) -> u32 {
        let mut bytes = [0u8; COUNTER_SIZE];
        bytes.copy_from_slice(&self.nonce[..COUNTER_SIZE]);
        u32::from_le_bytes(bytes)
    }

    fn reset_counter(&mut self) {
        self.nonce[..COUNTER_SIZE].copy_from_slice(&1u32.to_le_bytes());
    }

    #[cfg(test)]
    pub(crate) fn set_counter(&mut self, counter: u32) {
        self.nonce[..COUNTER_SIZE].copy_from_slice(&counter.to_le_bytes());
    }
}

/// Finish the MAC over `ciphertext || zeros(mlen % 16) || le64(ad_len) || le64(64 + mlen)`
///
/// The padding after the ciphertext is `mlen % 16` bytes, not the RFC 8439
/// complement, so the tail is generally not block aligned and has to go
/// through the unpadded path.
pub(crate) fn compute_mac(mut poly: Poly1305, ciphertext: &[u8], ad_len: usize) -> [u8; MAC_SIZE] {
    let mlen = ciphertext.len();
    let aligned = mlen - mlen % POLY_BLOCK_SIZE;
    poly.update_padded(&ciphertext[..aligned]);

    let mut tail = Vec::with_capacity(3 * POLY_BLOCK_SIZE);
    tail.extend_from_slice(&ciphertext[aligned..]);
    tail.resize(tail.len() + mlen % POLY_BLOCK_SIZE, 0);
    tail.extend_from_slice(&(ad_len as u64).to_le_bytes());
    tail.extend_from_slice(&((BLOCK_SIZE + mlen) as u64).to_le_bytes());

    let tag = poly.compute_unpadded(&tail);
    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(tag.as_slice());
    mac
}

impl Drop for PullStream {
    fn drop(&mut self) {
        self.nonce.zeroize();
    }
}

impl fmt::Debug for PullStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullStream")
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .field("key", &"<redacted>")
            .finish()
    }
}
