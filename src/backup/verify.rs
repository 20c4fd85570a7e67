//! Archive integrity checks
//!
//! A check streams the archive through decryption, decompression and tar
//! listing without extracting anything, then reads the stream to its end so
//! truncation anywhere is caught. Corruption is an outcome, not an error.

use std::fmt;
use std::io;
use std::path::Path;

use super::archive::open_archive;
use super::snapshot::STAGED_MANIFEST;
use crate::crypto::Passphrase;
use crate::error::EngineResult;
use crate::models::VerificationStatus;

/// Result of checking one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Every entry was readable
    Passed { entries: usize },
    /// The archive is unusable, with the reason
    Failed(String),
}

impl VerifyOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, VerifyOutcome::Passed { .. })
    }

    pub fn status(&self) -> VerificationStatus {
        match self {
            VerifyOutcome::Passed { .. } => VerificationStatus::Passed,
            VerifyOutcome::Failed(_) => VerificationStatus::Failed,
        }
    }

    /// Failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            VerifyOutcome::Passed { .. } => None,
            VerifyOutcome::Failed(reason) => Some(reason),
        }
    }
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyOutcome::Passed { entries } => write!(f, "passed ({} entries)", entries),
            VerifyOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Check an archive without modifying anything
pub fn verify_archive(path: &Path, passphrase: Option<&Passphrase>) -> VerifyOutcome {
    match list_entries(path, passphrase) {
        Ok(entries) => {
            tracing::debug!(archive = %path.display(), entries, "Archive verified");
            VerifyOutcome::Passed { entries }
        }
        Err(reason) => {
            tracing::warn!(archive = %path.display(), %reason, "Archive failed verification");
            VerifyOutcome::Failed(reason)
        }
    }
}

fn list_entries(path: &Path, passphrase: Option<&Passphrase>) -> Result<usize, String> {
    let opened: EngineResult<_> = open_archive(path, passphrase);
    let mut archive = opened.map_err(|e| e.to_string())?;

    let mut count = 0usize;
    let mut has_manifest = false;

    // Walking the entries reads through every member's data
    for entry in archive.entries().map_err(describe)? {
        let entry = entry.map_err(describe)?;
        let entry_path = entry.path().map_err(describe)?;
        if entry_path.as_os_str() == STAGED_MANIFEST {
            has_manifest = true;
        }
        count += 1;
    }

    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink()).map_err(describe)?;

    if !has_manifest {
        return Err(format!("archive has no {}", STAGED_MANIFEST));
    }

    Ok(count)
}

fn describe(e: io::Error) -> String {
    format!("unreadable archive: {}", e)
}
