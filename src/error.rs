use thiserror::Error;

/// Error types for key derivation and stream decryption
///
/// No variant ever carries plaintext, key or password bytes.
#[derive(Debug, Error)]
pub enum PullError {
    /// Key-derivation cost parameters or salt length out of range
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Salt could not be decoded from its text encoding
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Wrong-length key or stream header at engine construction
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// A chunk failed verification (tampered, reordered, malformed or wrong key).
    /// The engine that produced this error is permanently failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// `pull` was called after a FINAL chunk had been accepted
    #[error("Stream already finalized")]
    StreamAlreadyFinalized,

    /// Input ran out before a FINAL chunk was observed
    #[error("Stream truncated: input ended before the final chunk")]
    TruncatedStream,

    /// I/O error while sourcing chunks or sinking plaintext
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PullError>;

impl PullError {
    /// True for failures that indicate tampering or a wrong key rather than
    /// a caller mistake.
    pub fn is_security_event(&self) -> bool {
        matches!(self, PullError::AuthenticationFailed(_))
    }
}
