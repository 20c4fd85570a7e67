//! Backup set model and file naming conventions
//!
//! A backup set is an archive plus a sibling manifest sharing the same base
//! name: `<tier>_<label>.tar.zst[.enc]` and `<tier>_<label>.manifest`.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tier::Tier;

/// Extension of a plain compressed archive
pub const ARCHIVE_EXT: &str = ".tar.zst";

/// Extra suffix marking an encrypted archive
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Extension of the sibling manifest
pub const MANIFEST_EXT: &str = ".manifest";

/// Suffix of files still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Outcome of an integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unknown => "unknown",
            VerificationStatus::Passed => "passed",
            VerificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "passed" | "success" => VerificationStatus::Passed,
            "failed" | "failure" => VerificationStatus::Failed,
            _ => VerificationStatus::Unknown,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed, immutable snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSet {
    /// Base name shared by archive and manifest, e.g. `daily_20250101_020000_000`
    pub name: String,
    /// Retention tier
    pub tier: Tier,
    /// When the archive build completed
    pub created_at: DateTime<Utc>,
    /// Domains actually included in the archive
    pub source_domains: Vec<String>,
    /// Size of the final archive file in bytes
    pub size_bytes: u64,
    /// Whether the archive is wrapped in encryption
    pub encrypted: bool,
    /// Last known integrity status
    pub verification_status: VerificationStatus,
    /// Location of the archive
    pub archive_path: PathBuf,
    /// Location of the manifest
    pub manifest_path: PathBuf,
}

/// Archive file name for a set
pub fn archive_file_name(name: &str, encrypted: bool) -> String {
    if encrypted {
        format!("{}{}{}", name, ARCHIVE_EXT, ENCRYPTED_SUFFIX)
    } else {
        format!("{}{}", name, ARCHIVE_EXT)
    }
}

/// Manifest file name for a set
pub fn manifest_file_name(name: &str) -> String {
    format!("{}{}", name, MANIFEST_EXT)
}

/// Split an archive file name into its set name and encryption flag
///
/// Returns `None` for anything that isn't a finished archive.
pub fn parse_archive_file_name(file_name: &str) -> Option<(String, bool)> {
    if file_name.ends_with(PARTIAL_SUFFIX) {
        return None;
    }
    if let Some(stem) = file_name.strip_suffix(ENCRYPTED_SUFFIX) {
        let name = stem.strip_suffix(ARCHIVE_EXT)?;
        return (!name.is_empty()).then(|| (name.to_string(), true));
    }
    let name = file_name.strip_suffix(ARCHIVE_EXT)?;
    (!name.is_empty()).then(|| (name.to_string(), false))
}

/// Whether a path names an encrypted archive
pub fn is_encrypted_path(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(ENCRYPTED_SUFFIX))
        .unwrap_or(false)
}

/// Manifest path sitting beside an archive path
pub fn manifest_path_for(archive_path: &Path) -> Option<PathBuf> {
    let file_name = archive_path.file_name()?.to_string_lossy().to_string();
    let (name, _) = parse_archive_file_name(&file_name)?;
    Some(archive_path.with_file_name(manifest_file_name(&name)))
}
