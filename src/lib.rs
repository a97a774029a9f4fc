//! PULLSTREAM - password-keyed streaming decryption
//!
//! Recovers plaintext from a chunked encrypted stream given a password,
//! the Argon2id salt and costs, and the per-stream header:
//! - Argon2id (single lane, 32-byte output) for key derivation
//! - XChaCha20-Poly1305 secretstream (libsodium-compatible) for the chunks
//!
//! # Security Features
//! - Every chunk authenticates against a ratcheted subkey and nonce, so
//!   tampering, reordering, replay and dropped chunks are detected
//! - Truncation is reported separately from tampering
//! - Keys, subkeys and passwords live in zeroizing wrappers
//!
//! # Architecture
//! - `error`: Error types and result aliases
//! - `secret`: Memory-safe secret wrappers
//! - `format`: Wire constants, tags and the stream header
//! - `kdf`: Password to key derivation
//! - `stream`: The pull state machine
//! - `ops`: Whole-stream helpers (iterators, async readers)
//!
//! # Example
//! ```rust,ignore
//! use pullstream::{derive_key, PullStream, Secret, StreamHeader, TagKind};
//!
//! let password = Secret::from_slice(b"my-password");
//! let key = derive_key(&password, salt_b64, mem_limit, ops_limit)?;
//! let mut stream = PullStream::init(&key, &StreamHeader::from_bytes(&header)?);
//! drop(key);
//!
//! for chunk in chunks {
//!     let (plaintext, tag) = stream.pull(&chunk)?;
//!     sink(&plaintext);
//!     if tag == TagKind::Final {
//!         break;
//!     }
//! }
//! if !stream.is_finalized() {
//!     // truncated stream
//! }
//! ```

pub mod error;
pub mod format;
pub mod kdf;
pub mod ops;
pub mod secret;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{PullError, Result};
pub use format::{StreamHeader, TagKind, ABYTES, DEFAULT_CHUNK_SIZE, HEADER_SIZE, KEY_SIZE};
pub use kdf::{derive_key, derive_key_with, KdfParams};
pub use ops::{decrypt_chunks, decrypt_reader, decrypt_single, open_with_password, verify_chunks};
pub use secret::{DerivedKey, Secret, SecretArray};
pub use stream::{PullStream, StreamState};
