//! Backup lifecycle and retention engine
//!
//! Takes consistent snapshots of a self-hosted workflow-automation server's
//! data domains, packs them into compressed and optionally encrypted
//! archives, verifies them, enforces tiered retention under storage pressure
//! and restores them safely.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Settings and backup-root path derivation
//! - `error`: Custom error types
//! - `models`: Tiers, backup sets and the last-run record
//! - `storage`: Atomic writes, tree copies, the run lock and disk usage
//! - `crypto`: Streaming AES-256-GCM with Argon2id key derivation
//! - `integrations`: Cache store, notifier, service controller, confirmation
//! - `backup`: Snapshot, archive, verify, retention, restore and inventory
//! - `audit`: Append-only event journal
//! - `cli` / `display`: `backupctl` command handlers and formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use backup_lifecycle::backup::{BackupRequest, BackupRunner};
//! use backup_lifecycle::config::Settings;
//!
//! let settings = Settings::load_or_create(path)?;
//! let set = BackupRunner::new(&settings, None, &notifier, &journal).run(BackupRequest {
//!     tier: Tier::Daily,
//!     label: None,
//!     passphrase: None,
//! })?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod models;
pub mod storage;

pub use error::{EngineError, EngineResult};
