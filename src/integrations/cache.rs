//! Point-in-time dumps of the key-value cache store

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use super::run_command_with_timeout;
use crate::config::settings::CacheSettings;
use crate::error::{EngineError, EngineResult};

/// A store that can write a consistent dump of itself on request
pub trait CacheStore {
    /// Trigger a dump and wait for it, returning the dump file
    ///
    /// Implementations bound the wait themselves; exceeding it is an error.
    fn dump(&self) -> EngineResult<PathBuf>;
}

/// Drives a Redis-compatible CLI: `BGSAVE`, then polls `LASTSAVE`
#[derive(Debug, Clone)]
pub struct CommandCacheStore {
    command: Vec<String>,
    dump_path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl CommandCacheStore {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            command: settings.command.clone(),
            dump_path: settings.dump_path.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Run one CLI command within what is left of the dump deadline
    fn query(&self, command: &str, deadline: Instant) -> EngineResult<String> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.timed_out());
        }
        let out = run_command_with_timeout(&self.command, &[command], None, Some(remaining))?;
        Ok(out.trim().to_string())
    }

    fn timed_out(&self) -> EngineError {
        EngineError::Io(format!(
            "Cache dump did not complete within {}ms",
            self.timeout.as_millis()
        ))
    }
}

impl CacheStore for CommandCacheStore {
    fn dump(&self) -> EngineResult<PathBuf> {
        let deadline = Instant::now() + self.timeout;
        let before = self.query("LASTSAVE", deadline)?;
        self.query("BGSAVE", deadline)?;

        while self.query("LASTSAVE", deadline)? == before {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out());
            }
            thread::sleep(self.poll_interval.min(remaining));
        }

        if !self.dump_path.is_file() {
            return Err(EngineError::Io(format!(
                "Cache dump file {} not found",
                self.dump_path.display()
            )));
        }

        Ok(self.dump_path.clone())
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dump_times_out_when_lastsave_never_changes() {
        let temp_dir = TempDir::new().unwrap();
        let store = CommandCacheStore {
            // `echo` answers every command with the same text
            command: vec!["echo".into()],
            dump_path: temp_dir.path().join("dump.rdb"),
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        // Either the poll loop or the last CLI call runs out of time
        let err = store.dump().unwrap_err();
        assert!(err.to_string().contains("did not"));
    }

    #[test]
    fn test_hung_cli_is_bounded_by_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let store = CommandCacheStore {
            command: vec!["sh".into(), "-c".into(), "sleep 3".into()],
            dump_path: temp_dir.path().join("dump.rdb"),
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        };

        let started = Instant::now();
        assert!(store.dump().is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_dump_succeeds_when_lastsave_advances() {
        let temp_dir = TempDir::new().unwrap();
        let dump = temp_dir.path().join("dump.rdb");
        std::fs::write(&dump, "REDIS0009").unwrap();

        // Prints a growing counter on every call; the appended operand only
        // becomes $0
        let counter = temp_dir.path().join("calls");
        let script = format!("echo x >> '{0}'; wc -l < '{0}'", counter.display());
        let store = CommandCacheStore {
            command: vec!["sh".into(), "-c".into(), script],
            dump_path: dump.clone(),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        };

        assert_eq!(store.dump().unwrap(), dump);
    }
}
