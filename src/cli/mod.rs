//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup engine.

pub mod backup;
pub mod cleanup;
pub mod config;
pub mod restore;

pub use backup::{
    handle_create_command, handle_history_command, handle_list_command, handle_status_command,
    handle_verify_command,
};
pub use cleanup::handle_cleanup_command;
pub use config::handle_config_command;
pub use restore::handle_restore_command;

use crate::config::Settings;
use crate::crypto::Passphrase;
use crate::error::EngineResult;
use crate::integrations::{notify_best_effort, Notifier};

/// Find a passphrase: passphrase file, then environment, then a prompt if asked
///
/// Returns `None` when nothing is configured and no prompt was requested.
pub(crate) fn resolve_passphrase(settings: &Settings, ask: bool) -> EngineResult<Option<Passphrase>> {
    if let Some(passphrase) = Passphrase::from_settings(&settings.encryption)? {
        return Ok(Some(passphrase));
    }

    if ask {
        return Passphrase::prompt("Archive passphrase: ").map(Some);
    }

    Ok(None)
}

/// Pass a handler result through, notifying first if it is an abort
pub(crate) fn notify_on_abort<T>(
    notifier: &dyn Notifier,
    operation: &str,
    result: EngineResult<T>,
) -> EngineResult<T> {
    if let Err(err) = &result {
        tracing::error!(operation, error = %err, "Operation aborted");
        notify_best_effort(
            notifier,
            &format!("Backup FAILED: {}", operation),
            &format!("The {} was aborted.\n\nError: {}\n", operation, err),
        );
    }
    result
}
