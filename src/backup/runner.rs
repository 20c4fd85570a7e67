//! One backup run, end to end
//!
//! Snapshot, archive, verify, then record the outcome in the run state, the
//! journal and a notification. The caller holds the run lock.

use chrono::Utc;

use super::archive::ArchiveBuilder;
use super::snapshot::assemble;
use super::verify::{verify_archive, VerifyOutcome};
use crate::audit::{Journal, JournalEntry};
use crate::config::{EnginePaths, Settings};
use crate::crypto::Passphrase;
use crate::error::{EngineError, EngineResult};
use crate::integrations::{notify_best_effort, CacheStore, Notifier};
use crate::models::{BackupSet, RunState, Tier, VerificationStatus};

/// What to back up
#[derive(Debug, Clone, Copy)]
pub struct BackupRequest<'a> {
    pub tier: Tier,
    /// Operator label replacing the timestamp in the set name
    pub label: Option<&'a str>,
    /// Encrypt with this passphrase
    pub passphrase: Option<&'a Passphrase>,
}

pub struct BackupRunner<'a> {
    settings: &'a Settings,
    paths: EnginePaths,
    cache: Option<&'a dyn CacheStore>,
    notifier: &'a dyn Notifier,
    journal: &'a Journal,
}

impl<'a> BackupRunner<'a> {
    pub fn new(
        settings: &'a Settings,
        cache: Option<&'a dyn CacheStore>,
        notifier: &'a dyn Notifier,
        journal: &'a Journal,
    ) -> Self {
        Self {
            settings,
            paths: settings.paths(),
            cache,
            notifier,
            journal,
        }
    }

    /// Create, verify and record a new set
    ///
    /// A set that fails verification is kept (marked failed) but the run
    /// still returns an integrity error.
    pub fn run(&self, request: BackupRequest<'_>) -> EngineResult<BackupSet> {
        tracing::info!(tier = %request.tier, label = ?request.label, "Backup run starting");

        match self.create_and_verify(&request) {
            Ok((set, VerifyOutcome::Passed { .. })) => {
                self.record_state(request.tier, Some(&set), VerificationStatus::Passed);
                self.journal.record_best_effort(&JournalEntry::backup_created(&set));
                notify_best_effort(
                    self.notifier,
                    &format!("Backup succeeded: {}", set.name),
                    &success_body(&set),
                );
                tracing::info!(set = %set.name, size_bytes = set.size_bytes, "Backup run finished");
                Ok(set)
            }
            Ok((set, VerifyOutcome::Failed(reason))) => {
                self.record_state(request.tier, Some(&set), VerificationStatus::Failed);
                self.journal.record_best_effort(&JournalEntry::backup_created(&set));
                let err = EngineError::Integrity(format!(
                    "{} failed verification: {}",
                    set.archive_path.display(),
                    reason
                ));
                self.report_failure(request.tier, Some(&set.name), &err);
                Err(err)
            }
            Err(err) => {
                self.record_state(request.tier, None, VerificationStatus::Failed);
                self.report_failure(request.tier, None, &err);
                Err(err)
            }
        }
    }

    fn create_and_verify(
        &self,
        request: &BackupRequest<'_>,
    ) -> EngineResult<(BackupSet, VerifyOutcome)> {
        if self.settings.encryption.enabled && request.passphrase.is_none() {
            return Err(EngineError::Config(format!(
                "Encryption is enabled but no passphrase is available (set {} or passphrase_file)",
                self.settings.encryption.passphrase_env
            )));
        }

        self.paths.ensure_directories()?;

        let snapshot = assemble(&self.settings.domains, self.cache, self.paths.backup_root())?;
        if !snapshot.omitted().is_empty() {
            tracing::warn!(omitted = ?snapshot.omitted(), "Some domains were not included");
        }

        let builder = ArchiveBuilder::new(
            &self.paths,
            self.settings.compression_level,
            &self.settings.encryption,
        );
        let mut set = builder.build(&snapshot, request.tier, request.label, request.passphrase)?;
        drop(snapshot);

        let outcome = verify_archive(&set.archive_path, request.passphrase);
        set.verification_status = outcome.status();
        Ok((set, outcome))
    }

    fn record_state(&self, tier: Tier, set: Option<&BackupSet>, status: VerificationStatus) {
        let state = RunState {
            time: Utc::now(),
            tier,
            archive_path: set.map(|s| s.archive_path.clone()),
            size_bytes: set.map(|s| s.size_bytes).unwrap_or(0),
            verification_status: status,
        };
        if let Err(e) = state.save(&self.paths.state_file()) {
            tracing::warn!(error = %e, "Failed to record run state");
        }
    }

    fn report_failure(&self, tier: Tier, set_name: Option<&str>, err: &EngineError) {
        tracing::error!(%tier, error = %err, "Backup run failed");
        self.journal
            .record_best_effort(&JournalEntry::backup_failed(tier, set_name, &err.to_string()));
        notify_best_effort(
            self.notifier,
            &format!("Backup FAILED: {} run", tier),
            &format!("The {} backup did not complete.\n\nError: {}\n", tier, err),
        );
    }
}

fn success_body(set: &BackupSet) -> String {
    format!(
        "Set: {}\nTier: {}\nArchive: {}\nSize: {} bytes\nEncrypted: {}\nDomains: {}\nVerification: {}\n",
        set.name,
        set.tier,
        set.archive_path.display(),
        set.size_bytes,
        if set.encrypted { "yes" } else { "no" },
        set.source_domains.join(", "),
        set.verification_status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EventKind;
    use crate::config::DomainSpec;
    use crate::integrations::cache::testing::StaticCache;
    use crate::integrations::notify::testing::RecordingNotifier;
    use std::fs;
    use tempfile::TempDir;

    fn settings(temp: &TempDir) -> Settings {
        let live = temp.path().join("live/n8n");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("workflows.json"), "{}").unwrap();

        let mut settings = Settings::default();
        settings.backup_root = temp.path().join("backups");
        settings.domains = vec![
            DomainSpec::new("n8n", live, true),
            DomainSpec::new("uploads", temp.path().join("live/uploads"), false),
        ];
        settings.encryption = crate::crypto::key_derivation::fast_settings();
        settings.encryption.enabled = false;
        settings
    }

    #[test]
    fn test_successful_run_records_everything() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let journal = Journal::new(settings.paths().journal_file());
        let notifier = RecordingNotifier::default();

        let set = BackupRunner::new(&settings, None, &notifier, &journal)
            .run(BackupRequest {
                tier: Tier::Daily,
                label: None,
                passphrase: None,
            })
            .unwrap();

        assert_eq!(set.verification_status, VerificationStatus::Passed);
        assert!(set.name.starts_with("daily_"));

        let state = RunState::load(&settings.paths().state_file()).unwrap().unwrap();
        assert_eq!(state.tier, Tier::Daily);
        assert_eq!(state.archive_path.as_ref(), Some(&set.archive_path));
        assert_eq!(state.size_bytes, set.size_bytes);
        assert_eq!(state.verification_status, VerificationStatus::Passed);

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("succeeded"));

        let entries = journal.read_all().unwrap();
        assert_eq!(entries[0].event, EventKind::BackupCreated);

        // Staging directory is gone
        let hidden: Vec<_> = fs::read_dir(settings.paths().backup_root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".staging-"))
            .collect();
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_missing_required_domain_fails_run() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(&temp);
        settings.domains[0].source_path = temp.path().join("gone");
        let journal = Journal::new(settings.paths().journal_file());
        let notifier = RecordingNotifier::default();

        let err = BackupRunner::new(&settings, None, &notifier, &journal)
            .run(BackupRequest {
                tier: Tier::Weekly,
                label: None,
                passphrase: None,
            })
            .unwrap_err();

        assert!(err.is_config());
        let state = RunState::load(&settings.paths().state_file()).unwrap().unwrap();
        assert_eq!(state.verification_status, VerificationStatus::Failed);
        assert!(state.archive_path.is_none());
        assert!(notifier.sent.borrow()[0].0.contains("FAILED"));
        assert_eq!(journal.read_all().unwrap()[0].event, EventKind::BackupFailed);
    }

    #[test]
    fn test_encryption_enabled_needs_passphrase() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(&temp);
        settings.encryption.enabled = true;
        let journal = Journal::new(settings.paths().journal_file());
        let notifier = RecordingNotifier::default();
        let runner = BackupRunner::new(&settings, None, &notifier, &journal);

        let err = runner
            .run(BackupRequest {
                tier: Tier::Daily,
                label: None,
                passphrase: None,
            })
            .unwrap_err();
        assert!(err.is_config());

        let passphrase = Passphrase::new("pw");
        let set = runner
            .run(BackupRequest {
                tier: Tier::Daily,
                label: Some("sealed"),
                passphrase: Some(&passphrase),
            })
            .unwrap();
        assert!(set.encrypted);
        assert_eq!(set.verification_status, VerificationStatus::Passed);
    }

    #[test]
    fn test_cache_and_notifier_failures_are_not_fatal() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let journal = Journal::new(settings.paths().journal_file());
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let cache = StaticCache(None);

        let set = BackupRunner::new(&settings, Some(&cache), &notifier, &journal)
            .run(BackupRequest {
                tier: Tier::Manual,
                label: Some("pre-upgrade"),
                passphrase: None,
            })
            .unwrap();

        assert_eq!(set.name, "manual_pre-upgrade");
        assert_eq!(set.source_domains, vec!["n8n"]);
    }

    #[test]
    fn test_duplicate_label_fails() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let journal = Journal::new(settings.paths().journal_file());
        let notifier = RecordingNotifier::default();
        let runner = BackupRunner::new(&settings, None, &notifier, &journal);
        let request = BackupRequest {
            tier: Tier::Manual,
            label: Some("once"),
            passphrase: None,
        };

        runner.run(request).unwrap();
        assert!(runner.run(request).is_err());
    }
}
