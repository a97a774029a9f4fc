use crate::error::{PullError, Result};
use crate::format::KEY_SIZE;
use crate::secret::{DerivedKey, Secret};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Salt length expected after decoding (libsodium `crypto_pwhash_SALTBYTES`)
pub const SALT_SIZE: usize = 16;

/// Smallest accepted `memory_cost`, in bytes
pub const MIN_MEMORY_COST: u64 = 1024;

/// Smallest accepted `time_cost` (Argon2 passes)
pub const MIN_TIME_COST: u32 = 1;

// Single lane; Argon2 needs at least 8 KiB per lane
const PARALLELISM: u32 = 1;
const MIN_MEMORY_KIB: u64 = 8 * PARALLELISM as u64;

/// Argon2id cost parameters
///
/// `memory_cost` is in bytes, the unit stored in libsodium-produced
/// metadata (`memlimit`). It is converted to KiB before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_cost: u64,
    pub time_cost: u32,
}

impl KdfParams {
    /// libsodium `OPSLIMIT_INTERACTIVE` / `MEMLIMIT_INTERACTIVE`
    pub const INTERACTIVE: KdfParams = KdfParams {
        memory_cost: 64 * 1024 * 1024,
        time_cost: 2,
    };

    /// libsodium `OPSLIMIT_MODERATE` / `MEMLIMIT_MODERATE`
    pub const MODERATE: KdfParams = KdfParams {
        memory_cost: 256 * 1024 * 1024,
        time_cost: 3,
    };

    /// libsodium `OPSLIMIT_SENSITIVE` / `MEMLIMIT_SENSITIVE`
    pub const SENSITIVE: KdfParams = KdfParams {
        memory_cost: 1024 * 1024 * 1024,
        time_cost: 4,
    };

    /// `memory_cost` in bytes, `time_cost` in passes; checked by [`KdfParams::validate`]
    pub fn new(memory_cost: u64, time_cost: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
        }
    }

    /// Check the costs and return the Argon2 memory size in KiB
    pub fn validate(&self) -> Result<u32> {
        if self.memory_cost < MIN_MEMORY_COST || self.time_cost < MIN_TIME_COST {
            return Err(PullError::InvalidParameters(format!(
                "memory_cost must be >= {} and time_cost >= {}, got {} and {}",
                MIN_MEMORY_COST, MIN_TIME_COST, self.memory_cost, self.time_cost
            )));
        }

        let memory_kib = self.memory_cost / 1024;
        if memory_kib < MIN_MEMORY_KIB {
            return Err(PullError::InvalidParameters(format!(
                "memory_cost {} is below the Argon2 minimum of {} bytes",
                self.memory_cost,
                MIN_MEMORY_KIB * 1024
            )));
        }

        u32::try_from(memory_kib).map_err(|_| {
            PullError::InvalidParameters(format!("memory_cost {} is too large", self.memory_cost))
        })
    }
}

/// Decode a standard-base64 salt
pub fn decode_salt(salt_encoded: &str) -> Result<[u8; SALT_SIZE]> {
    let decoded = STANDARD
        .decode(salt_encoded)
        .map_err(|e| PullError::InvalidEncoding(format!("salt is not valid base64: {}", e)))?;

    decoded.as_slice().try_into().map_err(|_| {
        PullError::InvalidParameters(format!(
            "salt must be {} bytes, got {}",
            SALT_SIZE,
            decoded.len()
        ))
    })
}

/// Derive a 32-byte stream key from a password with Argon2id
///
/// - `salt_encoded`: standard base64 of a 16-byte salt
/// - `memory_cost`: bytes (minimum 1024; Argon2 itself needs 8 KiB)
/// - `time_cost`: passes (minimum 1)
///
/// Parallelism is fixed at 1 and the output at 32 bytes. The result is
/// deterministic for identical inputs, so the same salt must never be
/// shared between unrelated credentials.
pub fn derive_key(
    password: &Secret,
    salt_encoded: &str,
    memory_cost: u64,
    time_cost: u32,
) -> Result<DerivedKey> {
    derive_key_with(password, salt_encoded, &KdfParams::new(memory_cost, time_cost))
}

/// [`derive_key`] taking a [`KdfParams`]
pub fn derive_key_with(
    password: &Secret,
    salt_encoded: &str,
    params: &KdfParams,
) -> Result<DerivedKey> {
    let memory_kib = params.validate()?;
    let salt = decode_salt(salt_encoded)?;

    debug!(
        memory_kib,
        time_cost = params.time_cost,
        "deriving stream key with Argon2id"
    );

    let argon2_params = ParamsBuilder::new()
        .m_cost(memory_kib)
        .t_cost(params.time_cost)
        .p_cost(PARALLELISM)
        .output_len(KEY_SIZE)
        .build()
        .map_err(|e| PullError::InvalidParameters(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = DerivedKey::zero();
    password.expose(|pwd| {
        key.expose_mut(|out| {
            argon2
                .hash_password_into(pwd, &salt, out)
                .map_err(|e| PullError::InvalidParameters(format!("Argon2 failed: {}", e)))
        })
    })?;

    Ok(key)
}
