use crate::error::{PullError, Result};
use crate::format::KEY_SIZE;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Variable-length secret bytes (passwords)
///
/// - Zeroes memory on drop
/// - No `Clone`, redacted `Debug`
/// - Contents only reachable inside a closure
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    data: Vec<u8>,
}

impl Secret {
    /// Take ownership of `data`; it is zeroized when the `Secret` is dropped
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Copy `slice` into a new `Secret`. The caller still owns (and should
    /// clear) the original.
    pub fn from_slice(slice: &[u8]) -> Self {
        Self {
            data: slice.to_vec(),
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Access the secret bytes for the duration of `f`
    pub fn expose<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.data)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.data.len())
            .field("data", &"<redacted>")
            .finish()
    }
}

/// Fixed-size secret (keys and ratcheted subkeys)
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretArray<const N: usize> {
    data: [u8; N],
}

/// 32-byte key produced by [`crate::kdf::derive_key`]
pub type DerivedKey = SecretArray<KEY_SIZE>;

impl<const N: usize> SecretArray<N> {
    /// Take ownership of `data`; the array is zeroized on drop
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    /// All-zero array, to be filled through [`SecretArray::expose_mut`]
    pub fn zero() -> Self {
        Self { data: [0u8; N] }
    }

    /// Copy a slice of exactly `N` bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != N {
            return Err(PullError::InvalidKeyMaterial(format!(
                "key must be {} bytes, got {}",
                N,
                slice.len()
            )));
        }
        let mut data = [0u8; N];
        data.copy_from_slice(slice);
        Ok(Self { data })
    }

    /// Access the secret bytes for the duration of `f`
    pub fn expose<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; N]) -> R,
    {
        f(&self.data)
    }

    /// Mutable access for the duration of `f`
    pub fn expose_mut<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8; N]) -> R,
    {
        f(&mut self.data)
    }
}

impl<const N: usize> fmt::Debug for SecretArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretArray")
            .field("len", &N)
            .field("data", &"<redacted>")
            .finish()
    }
}
