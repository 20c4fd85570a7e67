//! Path management for the backup engine
//!
//! Every location the engine touches is derived from the backup root:
//!
//! ```text
//! <root>/daily/            tier directories holding archive + manifest pairs
//! <root>/weekly/
//! <root>/monthly/
//! <root>/manual/
//! <root>/pre-restore/      safety snapshots taken before a restore
//! <root>/last_backup.state last run record
//! <root>/journal.jsonl     append-only event journal
//! <root>/.backup.lock      run lock
//! ```

use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::models::Tier;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/backup-lifecycle/config.json";

/// Manages all paths used by the engine
#[derive(Debug, Clone)]
pub struct EnginePaths {
    /// Root directory holding every tier
    backup_root: PathBuf,
}

impl EnginePaths {
    /// Create EnginePaths rooted at the given directory
    pub fn new(backup_root: PathBuf) -> Self {
        Self { backup_root }
    }

    /// Get the backup root
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Directory holding one tier's sets
    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.backup_root.join(tier.as_str())
    }

    /// Directory holding pre-restore safety snapshots
    pub fn pre_restore_dir(&self) -> PathBuf {
        self.backup_root.join("pre-restore")
    }

    /// Get the path to the last-run record
    pub fn state_file(&self) -> PathBuf {
        self.backup_root.join("last_backup.state")
    }

    /// Get the path to the event journal
    pub fn journal_file(&self) -> PathBuf {
        self.backup_root.join("journal.jsonl")
    }

    /// Get the path to the run lock
    pub fn lock_file(&self) -> PathBuf {
        self.backup_root.join(".backup.lock")
    }

    /// Ensure the root and every tier directory exist
    pub fn ensure_directories(&self) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.backup_root)
            .map_err(|e| EngineError::Io(format!("Failed to create backup root: {}", e)))?;

        for tier in Tier::ALL {
            std::fs::create_dir_all(self.tier_dir(tier)).map_err(|e| {
                EngineError::Io(format!("Failed to create {} directory: {}", tier, e))
            })?;
        }

        Ok(())
    }
}
