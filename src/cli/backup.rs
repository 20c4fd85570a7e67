//! Backup CLI commands
//!
//! Implements `create`, `list`, `verify`, `status` and `history`.

use std::path::PathBuf;

use super::{notify_on_abort, resolve_passphrase};
use crate::audit::{Journal, JournalEntry};
use crate::backup::inventory::last_run;
use crate::backup::restore::resolve_archive;
use crate::backup::{list_sets, verify_archive, BackupRequest, BackupRunner, VerifyOutcome};
use crate::config::Settings;
use crate::crypto::Passphrase;
use crate::display::{format_history, format_run_state, format_set_list, format_size};
use crate::error::{EngineError, EngineResult};
use crate::integrations::notify;
use crate::integrations::{CacheStore, CommandCacheStore, Notifier};
use crate::models::backup_set::is_encrypted_path;
use crate::models::{RunState, Tier};
use crate::storage::{FsProbe, RunLock, StorageProbe};

/// Target keyword selecting every set
const ALL: &str = "all";

/// Create a new set in `tier`
pub fn handle_create_command(
    settings: &Settings,
    tier: Tier,
    name: Option<&str>,
    ask_passphrase: bool,
) -> EngineResult<()> {
    let notifier = notify::from_settings(&settings.notify);
    create(settings, notifier.as_ref(), tier, name, ask_passphrase)
}

fn create(
    settings: &Settings,
    notifier: &dyn Notifier,
    tier: Tier,
    name: Option<&str>,
    ask_passphrase: bool,
) -> EngineResult<()> {
    // Failures past this point are reported by the runner itself
    let (_lock, passphrase) = notify_on_abort(
        notifier,
        &format!("{} run", tier),
        prepare_create(settings, ask_passphrase),
    )?;

    let paths = settings.paths();
    let cache = settings.cache.as_ref().map(CommandCacheStore::new);
    let journal = Journal::new(paths.journal_file());
    let runner = BackupRunner::new(
        settings,
        cache.as_ref().map(|c| c as &dyn CacheStore),
        notifier,
        &journal,
    );

    println!("Creating {} backup...", tier);
    let set = runner.run(BackupRequest {
        tier,
        label: name,
        passphrase: passphrase.as_ref(),
    })?;

    println!("Backup created: {}", set.name);
    println!("Location:     {}", set.archive_path.display());
    println!("Size:         {}", format_size(set.size_bytes));
    println!("Domains:      {}", set.source_domains.join(", "));
    println!("Encrypted:    {}", if set.encrypted { "yes" } else { "no" });
    println!("Verification: {}", set.verification_status);

    Ok(())
}

fn prepare_create(
    settings: &Settings,
    ask_passphrase: bool,
) -> EngineResult<(RunLock, Option<Passphrase>)> {
    let lock = RunLock::acquire(&settings.paths().lock_file(), "create")?;

    let passphrase = if settings.encryption.enabled || ask_passphrase {
        resolve_passphrase(settings, ask_passphrase)?
    } else {
        None
    };

    Ok((lock, passphrase))
}

/// List sets in one tier, or all tiers when `tier` is "all"
pub fn handle_list_command(settings: &Settings, tier: &str) -> EngineResult<()> {
    let tier = if tier.eq_ignore_ascii_case(ALL) {
        None
    } else {
        Some(tier.parse::<Tier>()?)
    };

    let inventory = list_sets(&settings.paths(), tier)?;
    println!("{}", format_set_list(&inventory));
    Ok(())
}

/// Verify one set (by name or path) or every set
///
/// Keeps going past failures; returns an integrity error if any target failed.
pub fn handle_verify_command(
    settings: &Settings,
    target: &str,
    ask_passphrase: bool,
) -> EngineResult<()> {
    let paths = settings.paths();

    let targets: Vec<PathBuf> = if target.eq_ignore_ascii_case(ALL) {
        list_sets(&paths, None)?
            .sets
            .into_iter()
            .map(|s| s.archive_path)
            .collect()
    } else {
        vec![resolve_archive(&paths, target)?]
    };

    if targets.is_empty() {
        println!("No backup sets to verify.");
        return Ok(());
    }

    let passphrase = if targets.iter().any(|p| is_encrypted_path(p)) {
        resolve_passphrase(settings, ask_passphrase)?
    } else {
        None
    };

    let journal = Journal::new(paths.journal_file());
    let mut state = last_run(&paths).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not read run state");
        None
    });

    let mut failed = 0usize;
    for archive in &targets {
        let outcome = verify_archive(archive, passphrase.as_ref());
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| archive.display().to_string());

        match &outcome {
            VerifyOutcome::Passed { entries } => {
                println!("PASS  {} ({} entries)", name, entries);
            }
            VerifyOutcome::Failed(reason) => {
                failed += 1;
                println!("FAIL  {}: {}", name, reason);
            }
        }

        journal.record_best_effort(&JournalEntry::verified(
            archive,
            outcome.status(),
            outcome.reason(),
        ));

        if let Some(state) = state.as_mut() {
            if state.archive_path.as_deref() == Some(archive.as_path()) {
                update_state_status(state, &outcome, &paths.state_file());
            }
        }
    }

    println!();
    println!("Verified {} set(s): {} passed, {} failed", targets.len(), targets.len() - failed, failed);

    if failed > 0 {
        return Err(EngineError::Integrity(format!(
            "{} of {} set(s) failed verification",
            failed,
            targets.len()
        )));
    }

    Ok(())
}

fn update_state_status(state: &mut RunState, outcome: &VerifyOutcome, path: &std::path::Path) {
    state.verification_status = outcome.status();
    if let Err(e) = state.save(path) {
        tracing::warn!(error = %e, "Failed to update run state");
    }
}

/// Show the last run, tier totals and storage usage
pub fn handle_status_command(settings: &Settings) -> EngineResult<()> {
    let paths = settings.paths();

    let state = last_run(&paths)?;
    println!("{}", format_run_state(state.as_ref()));
    println!();

    let inventory = list_sets(&paths, None)?;
    println!("Sets");
    println!("====");
    for tier in Tier::ALL {
        let keep = settings
            .retention
            .keep_count(tier)
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!(
            "{:<8} {:>3} set(s)  {:>10}  (keep {})",
            tier.to_string(),
            inventory.count(tier),
            format_size(inventory.size(tier)),
            keep
        );
    }
    println!();

    match FsProbe.usage(paths.backup_root()) {
        Ok(usage) => println!(
            "Storage: {:.1}% used of {} (threshold {:.0}%)",
            usage.used_percent(),
            format_size(usage.capacity_bytes()),
            settings.retention.storage_threshold_percent
        ),
        Err(e) => println!("Storage: unknown ({})", e),
    }

    Ok(())
}

/// Show the most recent journal entries
pub fn handle_history_command(settings: &Settings, limit: usize) -> EngineResult<()> {
    let journal = Journal::new(settings.paths().journal_file());
    let entries = journal.read_recent(limit)?;
    println!("{}", format_history(&entries));
    Ok(())
}
