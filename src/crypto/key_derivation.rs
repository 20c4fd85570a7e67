//! Key derivation using Argon2id
//!
//! Derives archive encryption keys from operator passphrases using Argon2id,
//! a memory-hard key derivation function resistant to GPU/ASIC attacks.
//! The parameters travel in each encrypted archive's header, so an archive
//! stays decryptable after the configured costs change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::secure_memory::Passphrase;
use crate::config::settings::EncryptionSettings;
use crate::error::{EngineError, EngineResult};

/// Largest Argon2 memory cost accepted, in KiB (1 GiB)
pub const MAX_MEMORY_COST: u32 = 1024 * 1024;

/// Largest Argon2 iteration count accepted
pub const MAX_TIME_COST: u32 = 64;

/// Largest Argon2 lane count accepted
pub const MAX_PARALLELISM: u32 = 255;

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64 encoded)
    pub salt: String,
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism degree
    pub parallelism: u32,
}

impl KeyDerivationParams {
    /// Create params with a fresh random salt and the configured costs
    pub fn generate(settings: &EncryptionSettings) -> Self {
        let salt = SaltString::generate(&mut OsRng);
        Self {
            salt: salt.to_string(),
            memory_cost: settings.memory_cost,
            time_cost: settings.time_cost,
            parallelism: settings.parallelism,
        }
    }

    /// Reject costs outside the accepted ceilings
    ///
    /// Header values are read before anything is authenticated, so they are
    /// bounded here rather than handed to Argon2 as-is.
    pub fn check_bounds(&self) -> Result<(), String> {
        if self.memory_cost == 0 || self.memory_cost > MAX_MEMORY_COST {
            return Err(format!(
                "memory cost {} KiB outside 1..={}",
                self.memory_cost, MAX_MEMORY_COST
            ));
        }
        if self.time_cost == 0 || self.time_cost > MAX_TIME_COST {
            return Err(format!(
                "time cost {} outside 1..={}",
                self.time_cost, MAX_TIME_COST
            ));
        }
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(format!(
                "parallelism {} outside 1..={}",
                self.parallelism, MAX_PARALLELISM
            ));
        }
        Ok(())
    }

    /// Create params with specific values
    pub fn with_values(salt: String, memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            salt,
            memory_cost,
            time_cost,
            parallelism,
        }
    }
}

/// A derived encryption key, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    /// The 32-byte key for AES-256
    key: [u8; 32],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase
pub fn derive_key(passphrase: &Passphrase, params: &KeyDerivationParams) -> EngineResult<DerivedKey> {
    let salt = SaltString::from_b64(&params.salt)
        .map_err(|e| EngineError::Encryption(format!("Invalid salt: {}", e)))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32), // Output length for AES-256
    )
    .map_err(|e| EngineError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| EngineError::Encryption(format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| EngineError::Encryption("No hash output generated".to_string()))?;

    let hash_bytes = hash_output.as_bytes();

    if hash_bytes.len() < 32 {
        return Err(EngineError::Encryption(
            "Hash output too short for AES-256 key".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(DerivedKey { key })
}

#[cfg(test)]
pub(crate) fn fast_settings() -> EncryptionSettings {
    EncryptionSettings {
        enabled: true,
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        ..EncryptionSettings::default()
    }
}
