//! Record of the most recent backup attempt
//!
//! Stored as a small `key=value` file and overwritten on every run. Nothing
//! reads it for decisions; it exists for `status` and monitoring.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backup_set::VerificationStatus;
use super::tier::Tier;
use crate::error::EngineResult;
use crate::storage::file_io::{first, read_key_values, render_key_values, write_atomic};

/// Singleton last-run record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub time: DateTime<Utc>,
    pub tier: Tier,
    /// Empty when the run failed before an archive existed
    pub archive_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub verification_status: VerificationStatus,
}

impl RunState {
    /// Load the record, or `None` if no run has happened yet
    ///
    /// A record with unparseable fields is treated as absent.
    pub fn load(path: &Path) -> EngineResult<Option<Self>> {
        let Some(map) = read_key_values(path)? else {
            return Ok(None);
        };

        let time = first(&map, "last_backup_time")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        let tier = first(&map, "last_backup_type").and_then(|t| t.parse::<Tier>().ok());

        let (Some(time), Some(tier)) = (time, tier) else {
            tracing::warn!(path = %path.display(), "Ignoring malformed run state");
            return Ok(None);
        };

        Ok(Some(Self {
            time,
            tier,
            archive_path: first(&map, "last_backup_file")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            size_bytes: first(&map, "last_backup_size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            verification_status: first(&map, "last_backup_status")
                .map(VerificationStatus::parse)
                .unwrap_or_default(),
        }))
    }

    /// Overwrite the record atomically
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let contents = render_key_values([
            ("last_backup_time", self.time.to_rfc3339()),
            ("last_backup_type", self.tier.to_string()),
            (
                "last_backup_file",
                self.archive_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            ("last_backup_size", self.size_bytes.to_string()),
            ("last_backup_status", self.verification_status.to_string()),
        ]);
        write_atomic(path, contents.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("last_backup.state");

        let state = RunState {
            time: Utc::now(),
            tier: Tier::Weekly,
            archive_path: Some(PathBuf::from("/backups/weekly/weekly_a.tar.zst")),
            size_bytes: 4096,
            verification_status: VerificationStatus::Passed,
        };
        state.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("last_backup_type=weekly"));
        assert!(contents.contains("last_backup_status=passed"));

        let loaded = RunState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.tier, Tier::Weekly);
        assert_eq!(loaded.size_bytes, 4096);
        assert_eq!(loaded.archive_path, state.archive_path);
    }

    #[test]
    fn test_missing_state() {
        let temp_dir = TempDir::new().unwrap();
        assert!(RunState::load(&temp_dir.path().join("none")).unwrap().is_none());
    }
}
