//! Narrow interfaces to the collaborators the engine drives
//!
//! Each external tool sits behind a small trait with a command-backed
//! implementation built from settings, so the engine can be exercised with
//! in-process doubles.

pub mod cache;
pub mod confirm;
pub mod notify;
pub mod service;

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{EngineError, EngineResult};

pub use cache::{CacheStore, CommandCacheStore};
pub use confirm::{Confirmation, FixedAnswer, StdinConfirmation};
pub use notify::{notify_best_effort, CommandNotifier, LogNotifier, Notifier};
pub use service::{CommandServiceController, ServiceController};

/// Run a configured command with extra arguments, returning its stdout
///
/// `argv[0]` is the program. A non-zero exit is an I/O error carrying stderr.
pub(crate) fn run_command(argv: &[String], extra: &[&str], stdin: Option<&str>) -> EngineResult<String> {
    run_command_with_timeout(argv, extra, stdin, None)
}

/// Like [`run_command`], but kills the child once `timeout` elapses
///
/// Pipes are serviced on their own threads, so a large stdin body never
/// blocks on an unread stdout.
pub(crate) fn run_command_with_timeout(
    argv: &[String],
    extra: &[&str],
    stdin: Option<&str>,
    timeout: Option<Duration>,
) -> EngineResult<String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| EngineError::Config("Empty command".into()))?;

    let mut child = Command::new(program)
        .args(args)
        .args(extra)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::Io(format!("Failed to run {}: {}", program, e)))?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_owned();
            Some(thread::spawn(move || pipe.write_all(input.as_bytes())))
        }
        _ => None,
    };
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        Some(limit) => match child
            .wait_timeout(limit)
            .map_err(|e| EngineError::Io(format!("Failed to wait for {}: {}", program, e)))?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                // Reader threads are left to finish on their own; a grandchild
                // may still hold the pipes open
                return Err(EngineError::Io(format!(
                    "{} did not finish within {}ms and was killed",
                    program,
                    limit.as_millis()
                )));
            }
        },
        None => child
            .wait()
            .map_err(|e| EngineError::Io(format!("Failed to wait for {}: {}", program, e)))?,
    };

    if let Some(writer) = writer {
        match writer.join() {
            Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                return Err(EngineError::Io(format!(
                    "Failed to write to {}: {}",
                    program, e
                )));
            }
            _ => {}
        }
    }

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(EngineError::Io(format!(
            "{} exited with {}: {}",
            program,
            status,
            String::from_utf8_lossy(&stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_command_captures_stdout() {
        let out = run_command(&argv(&["echo"]), &["hello"], None).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_command_pipes_stdin() {
        let out = run_command(&argv(&["cat"]), &[], Some("body text")).unwrap();
        assert_eq!(out, "body text");
    }

    #[test]
    fn test_large_stdin_does_not_block_on_stdout() {
        let body = "x".repeat(1024 * 1024);
        let out = run_command(&argv(&["cat"]), &[], Some(&body)).unwrap();
        assert_eq!(out.len(), body.len());
    }

    #[test]
    fn test_timeout_kills_hung_command() {
        let started = std::time::Instant::now();
        let err = run_command_with_timeout(
            &argv(&["sh", "-c", "sleep 5"]),
            &[],
            None,
            Some(Duration::from_millis(100)),
        )
        .unwrap_err();

        assert!(err.to_string().contains("did not finish"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_fast_command_within_timeout() {
        let out = run_command_with_timeout(
            &argv(&["echo"]),
            &["ok"],
            None,
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(out.trim(), "ok");
    }

    #[test]
    fn test_non_zero_exit_is_error() {
        assert!(run_command(&argv(&["false"]), &[], None).is_err());
        assert!(run_command(&[], &[], None).unwrap_err().is_config());
    }
}
