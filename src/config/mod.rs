//! Configuration module for the backup engine
//!
//! This module provides configuration management including:
//! - Backup-root path derivation
//! - Settings persistence with per-field defaults
//! - Retention policy and domain registration

pub mod paths;
pub mod settings;

pub use paths::EnginePaths;
pub use settings::{DomainSpec, RetentionPolicy, Settings};
