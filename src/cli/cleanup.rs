//! Retention CLI command

use crate::audit::{Journal, JournalEntry};
use crate::backup::retention::DeletionReason;
use crate::backup::{RetentionManager, RetentionReport, SweepOptions};
use crate::config::Settings;
use crate::error::EngineResult;
use crate::integrations::{notify, notify_best_effort, Notifier};
use crate::storage::{FsProbe, RunLock, StorageProbe};

use super::notify_on_abort;

/// Apply the retention policy
///
/// A dry run takes no lock, deletes nothing and sends no success
/// notification.
pub fn handle_cleanup_command(settings: &Settings, options: SweepOptions) -> EngineResult<()> {
    let notifier = notify::from_settings(&settings.notify);
    cleanup(settings, notifier.as_ref(), &FsProbe, options)
}

fn cleanup(
    settings: &Settings,
    notifier: &dyn Notifier,
    probe: &dyn StorageProbe,
    options: SweepOptions,
) -> EngineResult<()> {
    let result = sweep(settings, probe, options);
    let report = notify_on_abort(notifier, "cleanup", result)?;

    if !report.dry_run {
        let journal = Journal::new(settings.paths().journal_file());
        for deleted in &report.deleted {
            journal.record_best_effort(&JournalEntry::set_deleted(
                &deleted.name,
                deleted.tier,
                deleted.bytes_freed,
                deleted.reason == DeletionReason::Pressure,
            ));
        }

        notify_best_effort(notifier, &report.subject(), &report.render());
    }

    print!("{}", report.render());
    Ok(())
}

fn sweep(
    settings: &Settings,
    probe: &dyn StorageProbe,
    options: SweepOptions,
) -> EngineResult<RetentionReport> {
    let paths = settings.paths();
    let _lock = if options.dry_run {
        None
    } else {
        Some(RunLock::acquire(&paths.lock_file(), "cleanup")?)
    };

    if options.dry_run {
        println!("Dry run: nothing will be deleted.");
        println!();
    }

    RetentionManager::new(&paths, &settings.retention, probe).sweep(options)
}
