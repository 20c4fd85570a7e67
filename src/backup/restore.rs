//! Restore orchestration
//!
//! Restoring is ordered so that nothing live changes until the archive has
//! been fully extracted and the operator has agreed:
//!
//! 1. resolve the target archive
//! 2. check a passphrase is available if it is encrypted
//! 3. extract into a scratch directory (any failure stops here)
//! 4. stop after reporting, for a dry run
//! 5. ask for confirmation
//! 6. copy live data to a pre-restore safety snapshot
//! 7. replace each domain
//! 8. restart dependent services

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;

use super::archive::open_archive;
use super::snapshot::{CACHE_DOMAIN, STAGED_MANIFEST};
use crate::audit::{Journal, JournalEntry};
use crate::config::{EnginePaths, Settings};
use crate::crypto::Passphrase;
use crate::error::{EngineError, EngineResult};
use crate::integrations::{Confirmation, ServiceController};
use crate::models::backup_set::{archive_file_name, is_encrypted_path, parse_archive_file_name};
use crate::models::Tier;
use crate::storage::file_io::{first, read_key_values};
use crate::storage::{copy_tree, remove_path};

/// Find an archive by path or by bare set name
///
/// Names are searched in daily, weekly, monthly, manual order; the first
/// match wins. A name may carry its archive suffix.
pub fn resolve_archive(paths: &EnginePaths, target: &str) -> EngineResult<PathBuf> {
    let as_path = PathBuf::from(target);
    if as_path.is_file() {
        return Ok(as_path);
    }

    let name = parse_archive_file_name(target)
        .map(|(name, _)| name)
        .unwrap_or_else(|| target.to_string());

    if !name.contains(['/', '\\']) {
        for tier in Tier::ALL {
            let dir = paths.tier_dir(tier);
            for encrypted in [false, true] {
                let candidate = dir.join(archive_file_name(&name, encrypted));
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }

    Err(EngineError::backup_not_found(target))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Report what would be restored and stop
    pub dry_run: bool,
    /// Don't restart services afterwards
    pub skip_service_restart: bool,
}

/// One domain to put back
#[derive(Debug, Clone, Serialize)]
pub struct RestoreTarget {
    pub identifier: String,
    /// Live location that will be replaced
    pub destination: PathBuf,
}

/// What a restore would do
#[derive(Debug, Clone, Serialize)]
pub struct RestorePreview {
    pub archive_path: PathBuf,
    pub created_at: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub targets: Vec<RestoreTarget>,
    /// Domains registered but absent from the archive, or archived but unregistered
    pub skipped: Vec<String>,
}

/// What a restore did
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub archive_path: PathBuf,
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
    /// Domains that could not be replaced, with the reason
    pub failed: Vec<(String, String)>,
    pub safety_snapshot: PathBuf,
    pub warnings: Vec<String>,
}

impl RestoreReport {
    pub fn all_restored(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![format!("Restored: {}", join_or_none(&self.restored))];
        if !self.skipped.is_empty() {
            parts.push(format!("Skipped: {}", self.skipped.join(", ")));
        }
        if !self.failed.is_empty() {
            let failed: Vec<String> = self.failed.iter().map(|(d, _)| d.clone()).collect();
            parts.push(format!("Failed: {}", failed.join(", ")));
        }
        parts.join("\n")
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[derive(Debug)]
pub enum RestoreOutcome {
    /// Dry run: nothing changed
    Previewed(RestorePreview),
    /// Operator declined: nothing changed
    Cancelled(RestorePreview),
    Completed(RestoreReport),
}

/// An archive unpacked into scratch space
struct Extracted {
    scratch: TempDir,
    preview: RestorePreview,
}

impl Extracted {
    fn staged(&self, identifier: &str) -> PathBuf {
        self.scratch.path().join(identifier)
    }
}

/// Puts live domains back from an archive
pub struct RestoreOrchestrator<'a> {
    settings: &'a Settings,
    paths: EnginePaths,
    confirmation: &'a dyn Confirmation,
    services: &'a dyn ServiceController,
    journal: &'a Journal,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        confirmation: &'a dyn Confirmation,
        services: &'a dyn ServiceController,
        journal: &'a Journal,
    ) -> Self {
        Self {
            settings,
            paths: settings.paths(),
            confirmation,
            services,
            journal,
        }
    }

    pub fn restore(
        &self,
        target: &str,
        passphrase: Option<&Passphrase>,
        options: RestoreOptions,
    ) -> EngineResult<RestoreOutcome> {
        let archive_path = resolve_archive(&self.paths, target)?;

        if is_encrypted_path(&archive_path) && passphrase.is_none() {
            return Err(EngineError::Config(format!(
                "{} is encrypted; provide a passphrase",
                archive_path.display()
            )));
        }

        let extracted = self.extract(&archive_path, passphrase)?;

        if options.dry_run {
            return Ok(RestoreOutcome::Previewed(extracted.preview));
        }

        let prompt = format!(
            "Restore {} domain(s) from {}? Live data will be overwritten",
            extracted.preview.targets.len(),
            archive_path.display()
        );
        if !self.confirmation.confirm(&prompt)? {
            tracing::info!(archive = %archive_path.display(), "Restore cancelled by operator");
            return Ok(RestoreOutcome::Cancelled(extracted.preview));
        }

        let safety_snapshot = self.take_safety_snapshot(&extracted.preview.targets)?;

        let mut report = RestoreReport {
            archive_path: archive_path.clone(),
            restored: Vec::new(),
            skipped: extracted.preview.skipped.clone(),
            failed: Vec::new(),
            safety_snapshot,
            warnings: Vec::new(),
        };

        for target in &extracted.preview.targets {
            let staged = extracted.staged(&target.identifier);
            match replace_live(&staged, &target.destination) {
                Ok(()) => {
                    tracing::info!(
                        domain = %target.identifier,
                        destination = %target.destination.display(),
                        "Domain restored"
                    );
                    report.restored.push(target.identifier.clone());
                }
                Err(e) => {
                    tracing::error!(domain = %target.identifier, error = %e, "Domain restore failed");
                    report.failed.push((target.identifier.clone(), e.to_string()));
                }
            }
        }

        if !options.skip_service_restart {
            for service in &self.settings.services.names {
                if let Err(e) = self.services.restart(service) {
                    tracing::warn!(service = %service, error = %e, "Service restart failed");
                    report
                        .warnings
                        .push(format!("Service {} did not restart: {}", service, e));
                }
            }
        }

        self.journal.record_best_effort(&JournalEntry::restore_performed(
            &report.archive_path,
            &report.restored,
            report.failed.len(),
            &report.safety_snapshot,
        ));

        Ok(RestoreOutcome::Completed(report))
    }

    /// Unpack the whole archive before anything live is touched
    fn extract(&self, archive_path: &Path, passphrase: Option<&Passphrase>) -> EngineResult<Extracted> {
        let root = self.paths.backup_root();
        fs::create_dir_all(root)
            .map_err(|e| EngineError::Io(format!("Failed to create {}: {}", root.display(), e)))?;

        let scratch = tempfile::Builder::new()
            .prefix(".restore-")
            .tempdir_in(root)
            .map_err(|e| EngineError::Io(format!("Failed to create scratch directory: {}", e)))?;

        let mut archive = open_archive(archive_path, passphrase).map_err(|e| match e {
            EngineError::Config(_) => e,
            other => EngineError::Integrity(other.to_string()),
        })?;
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);

        // Drain past the tar end marker so a truncated stream is caught
        let unpacked = match archive.unpack(scratch.path()) {
            Ok(()) => {
                let mut rest = archive.into_inner();
                io::copy(&mut rest, &mut io::sink()).map(|_| ())
            }
            Err(e) => Err(e),
        };
        unpacked.map_err(|e| {
            EngineError::Integrity(format!(
                "Failed to extract {}: {}",
                archive_path.display(),
                e
            ))
        })?;

        let manifest = read_key_values(scratch.path().join(STAGED_MANIFEST))?.ok_or_else(|| {
            EngineError::Integrity(format!(
                "{} has no {}",
                archive_path.display(),
                STAGED_MANIFEST
            ))
        })?;

        let archived: Vec<String> = manifest.get("domain").cloned().unwrap_or_default();
        let preview = self.plan(archive_path, &archived, scratch.path());

        Ok(Extracted {
            preview: RestorePreview {
                created_at: first(&manifest, "created_at")
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc)),
                hostname: first(&manifest, "hostname").map(str::to_string),
                ..preview
            },
            scratch,
        })
    }

    fn plan(&self, archive_path: &Path, archived: &[String], scratch: &Path) -> RestorePreview {
        let mut targets = Vec::new();
        let mut skipped = Vec::new();
        let in_archive = |id: &str| archived.iter().any(|a| a == id) && scratch.join(id).exists();

        for domain in &self.settings.domains {
            if in_archive(&domain.identifier) {
                targets.push(RestoreTarget {
                    identifier: domain.identifier.clone(),
                    destination: domain.source_path.clone(),
                });
            } else {
                tracing::info!(domain = %domain.identifier, "Domain not in archive, skipping");
                skipped.push(domain.identifier.clone());
            }
        }

        if in_archive(CACHE_DOMAIN) {
            match &self.settings.cache {
                Some(cache) => targets.push(RestoreTarget {
                    identifier: CACHE_DOMAIN.to_string(),
                    destination: cache.dump_path.clone(),
                }),
                None => skipped.push(CACHE_DOMAIN.to_string()),
            }
        }

        for id in archived {
            let registered = id == CACHE_DOMAIN
                || self.settings.domains.iter().any(|d| &d.identifier == id);
            if !registered {
                tracing::warn!(domain = %id, "Archived domain is not registered, skipping");
                skipped.push(id.clone());
            }
        }

        RestorePreview {
            archive_path: archive_path.to_path_buf(),
            created_at: None,
            hostname: None,
            targets,
            skipped,
        }
    }

    /// Copy every live destination aside; all or nothing
    fn take_safety_snapshot(&self, targets: &[RestoreTarget]) -> EngineResult<PathBuf> {
        let now = Utc::now();
        let dir = self.paths.pre_restore_dir().join(format!(
            "pre_restore_{}_{:03}",
            now.format("%Y%m%d_%H%M%S"),
            now.timestamp_subsec_millis()
        ));

        let copied = fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Io(format!("Failed to create {}: {}", dir.display(), e)))
            .and_then(|_| {
                for target in targets {
                    if target.destination.exists() {
                        copy_tree(&target.destination, &dir.join(&target.identifier))?;
                    }
                }
                Ok(())
            });

        if let Err(e) = copied {
            let _ = remove_path(&dir);
            return Err(EngineError::Io(format!(
                "Safety snapshot failed, restore aborted: {}",
                e
            )));
        }

        tracing::info!(snapshot = %dir.display(), "Safety snapshot taken");
        Ok(dir)
    }
}

/// Swap a staged copy in for live data
///
/// The new copy is built beside the destination first, so a failed copy
/// leaves the live data as it was.
fn replace_live(staged: &Path, destination: &Path) -> EngineResult<()> {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            EngineError::Config(format!("Cannot restore to {}", destination.display()))
        })?;
    let incoming = destination.with_file_name(format!(".{}.restoring", file_name));

    remove_path(&incoming)?;
    if let Err(e) = copy_tree(staged, &incoming) {
        let _ = remove_path(&incoming);
        return Err(e);
    }

    remove_path(destination)?;
    fs::rename(&incoming, destination).map_err(|e| {
        EngineError::Io(format!("Failed to move {} into place: {}", destination.display(), e))
    })
}
