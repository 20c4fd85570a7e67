//! Core data models for the backup engine
//!
//! Tiers, backup sets and the last-run record.

pub mod backup_set;
pub mod run_state;
pub mod tier;

pub use backup_set::{BackupSet, VerificationStatus};
pub use run_state::RunState;
pub use tier::Tier;
