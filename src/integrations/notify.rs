//! Notification sink
//!
//! Delivery is always best effort: a failing sink is logged and never
//! changes the outcome of the operation being reported.

use super::run_command;
use crate::config::settings::NotifySettings;
use crate::error::EngineResult;

/// Accepts `(subject, body)` pairs
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> EngineResult<()>;
}

/// Runs the configured program with the subject appended and the body on stdin
///
/// Fits `mail -s`, `logger`-style wrappers and webhook scripts alike.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, subject: &str, body: &str) -> EngineResult<()> {
        run_command(&self.command, &[subject], Some(body)).map(|_| ())
    }
}

/// Used when no sink is configured: notifications only reach the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> EngineResult<()> {
        tracing::info!(subject, "{}", body);
        Ok(())
    }
}

/// Build the notifier described by settings
pub fn from_settings(settings: &NotifySettings) -> Box<dyn Notifier> {
    if settings.command.is_empty() {
        Box::new(LogNotifier)
    } else {
        Box::new(CommandNotifier::new(settings.command.clone()))
    }
}

/// Send a notification, logging instead of failing
pub fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(subject, body) {
        tracing::warn!(subject, error = %e, "Notification delivery failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    use crate::error::EngineError;

    /// Records everything sent; optionally fails every delivery
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: RefCell<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, subject: &str, body: &str) -> EngineResult<()> {
            self.sent
                .borrow_mut()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                return Err(EngineError::Io("sink unavailable".into()));
            }
            Ok(())
        }
    }
}
