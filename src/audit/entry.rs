//! Journal entry data structures
//!
//! Defines the events the engine records and the entry format itself.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{BackupSet, Tier, VerificationStatus};

/// Events recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A backup run produced a set
    BackupCreated,
    /// A backup run aborted or its set failed verification
    BackupFailed,
    /// Retention removed a set
    SetDeleted,
    /// An archive was checked on demand
    Verified,
    /// Live data was overwritten from an archive
    RestorePerformed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::BackupCreated => write!(f, "CREATED"),
            EventKind::BackupFailed => write!(f, "FAILED"),
            EventKind::SetDeleted => write!(f, "DELETED"),
            EventKind::Verified => write!(f, "VERIFIED"),
            EventKind::RestorePerformed => write!(f, "RESTORED"),
        }
    }
}

/// A single journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the event occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub event: EventKind,

    /// Set the event concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// One-line human-readable summary
    pub summary: String,

    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JournalEntry {
    fn new(event: EventKind, summary: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            set_name: None,
            tier: None,
            summary,
            details: None,
        }
    }

    pub fn backup_created(set: &BackupSet) -> Self {
        Self {
            set_name: Some(set.name.clone()),
            tier: Some(set.tier),
            details: serde_json::to_value(set).ok(),
            ..Self::new(
                EventKind::BackupCreated,
                format!(
                    "{} bytes, {} domain(s), verification {}",
                    set.size_bytes,
                    set.source_domains.len(),
                    set.verification_status
                ),
            )
        }
    }

    pub fn backup_failed(tier: Tier, set_name: Option<&str>, reason: &str) -> Self {
        Self {
            set_name: set_name.map(str::to_string),
            tier: Some(tier),
            ..Self::new(EventKind::BackupFailed, reason.to_string())
        }
    }

    pub fn set_deleted(set_name: &str, tier: Tier, bytes: u64, emergency: bool) -> Self {
        let reason = if emergency {
            "storage pressure"
        } else {
            "retention count"
        };
        Self {
            set_name: Some(set_name.to_string()),
            tier: Some(tier),
            details: Some(json!({ "bytes_freed": bytes, "emergency": emergency })),
            ..Self::new(EventKind::SetDeleted, format!("removed ({})", reason))
        }
    }

    pub fn verified(archive_path: &Path, status: VerificationStatus, reason: Option<&str>) -> Self {
        let summary = match reason {
            Some(reason) => format!("{}: {}", status, reason),
            None => status.to_string(),
        };
        Self {
            set_name: archive_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string()),
            ..Self::new(EventKind::Verified, summary)
        }
    }

    pub fn restore_performed(
        archive_path: &Path,
        restored: &[String],
        failed: usize,
        safety_snapshot: &Path,
    ) -> Self {
        Self {
            set_name: archive_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string()),
            details: Some(json!({
                "restored": restored,
                "failed": failed,
                "safety_snapshot": safety_snapshot.display().to_string(),
            })),
            ..Self::new(
                EventKind::RestorePerformed,
                format!("{} domain(s) restored, {} failed", restored.len(), failed),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_snake_case() {
        let entry = JournalEntry::set_deleted("daily_a", Tier::Daily, 42, true);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event\":\"set_deleted\""));
        assert!(json.contains("\"tier\":\"daily\""));
        assert!(json.contains("storage pressure"));
    }

    #[test]
    fn test_failed_entry_without_set() {
        let entry = JournalEntry::backup_failed(Tier::Weekly, None, "required domain missing");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("set_name"));

        let parsed: JournalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event, EventKind::BackupFailed);
        assert_eq!(parsed.summary, "required domain missing");
    }
}
