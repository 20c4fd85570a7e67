//! Restore CLI command

use super::{notify_on_abort, resolve_passphrase};
use crate::audit::Journal;
use crate::backup::restore::{resolve_archive, RestorePreview};
use crate::backup::{RestoreOptions, RestoreOrchestrator, RestoreOutcome};
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::integrations::{
    notify, CommandServiceController, Confirmation, FixedAnswer, ServiceController,
    StdinConfirmation,
};
use crate::models::backup_set::is_encrypted_path;
use crate::storage::RunLock;

/// Restore live domains from a set
///
/// Declining the confirmation is a clean cancel, not an error.
pub fn handle_restore_command(
    settings: &Settings,
    target: &str,
    options: RestoreOptions,
    assume_yes: bool,
    ask_passphrase: bool,
) -> EngineResult<()> {
    let notifier = notify::from_settings(&settings.notify);
    let confirmation: Box<dyn Confirmation> = if assume_yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(StdinConfirmation)
    };
    let services = CommandServiceController::new(settings.services.restart_command.clone());

    let result = restore(
        settings,
        confirmation.as_ref(),
        &services,
        target,
        options,
        ask_passphrase,
    );
    notify_on_abort(notifier.as_ref(), "restore", result)
}

fn restore(
    settings: &Settings,
    confirmation: &dyn Confirmation,
    services: &dyn ServiceController,
    target: &str,
    options: RestoreOptions,
    ask_passphrase: bool,
) -> EngineResult<()> {
    let paths = settings.paths();
    let _lock = if options.dry_run {
        None
    } else {
        Some(RunLock::acquire(&paths.lock_file(), "restore")?)
    };

    let archive = resolve_archive(&paths, target)?;
    let passphrase = if is_encrypted_path(&archive) {
        resolve_passphrase(settings, ask_passphrase)?
    } else {
        None
    };

    let journal = Journal::new(paths.journal_file());
    let orchestrator = RestoreOrchestrator::new(settings, confirmation, services, &journal);

    let archive_target = archive.to_string_lossy();
    match orchestrator.restore(&archive_target, passphrase.as_ref(), options)? {
        RestoreOutcome::Previewed(preview) => {
            print_preview(&preview);
            println!();
            println!("Dry run: nothing was changed.");
        }
        RestoreOutcome::Cancelled(_) => {
            println!("Restore cancelled. Nothing was changed.");
        }
        RestoreOutcome::Completed(report) => {
            println!("Restore complete from {}", report.archive_path.display());
            println!("{}", report.summary());
            println!("Safety snapshot: {}", report.safety_snapshot.display());
            for warning in &report.warnings {
                println!("WARNING: {}", warning);
            }

            if !report.all_restored() {
                for (domain, reason) in &report.failed {
                    println!("  {}: {}", domain, reason);
                }
                return Err(EngineError::Io(format!(
                    "{} domain(s) failed to restore; live data can be recovered from {}",
                    report.failed.len(),
                    report.safety_snapshot.display()
                )));
            }
        }
    }

    Ok(())
}

fn print_preview(preview: &RestorePreview) {
    println!("Backup Information");
    println!("==================");
    println!("Archive:  {}", preview.archive_path.display());
    if let Some(created_at) = preview.created_at {
        println!("Created:  {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(hostname) = &preview.hostname {
        println!("Host:     {}", hostname);
    }
    println!();
    println!("Would restore:");
    if preview.targets.is_empty() {
        println!("  (nothing)");
    }
    for target in &preview.targets {
        println!("  {} -> {}", target.identifier, target.destination.display());
    }
    if !preview.skipped.is_empty() {
        println!("Skipped: {}", preview.skipped.join(", "));
    }
}
