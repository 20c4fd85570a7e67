//! Cryptographic functions for the backup engine
//!
//! Provides streaming AES-256-GCM encryption with Argon2id key derivation
//! for optional at-rest encryption of backup archives.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{DecryptingReader, EncryptingWriter};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::Passphrase;
