//! Exclusive run lock scoped to the backup root
//!
//! `create`, `cleanup` and `restore` hold this lock for their whole duration so
//! that two scheduler invocations never race on the same backup root.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{EngineError, EngineResult};

/// Held advisory lock; released when dropped
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Try to take the lock without blocking
    ///
    /// Fails with a policy violation when another process holds it.
    pub fn acquire(lock_path: &Path, operation: &str) -> EngineResult<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| EngineError::Io(format!("Failed to open lock file: {}", e)))?;

        if file.try_lock_exclusive().is_err() {
            return Err(EngineError::PolicyViolation(format!(
                "Another backup operation is running (lock held on {}); refusing to start {}",
                lock_path.display(),
                operation
            )));
        }

        // Informational only; the flock is what matters
        let _ = file.set_len(0);
        let _ = writeln!(file, "pid={}\noperation={}", std::process::id(), operation);

        tracing::debug!(lock = %lock_path.display(), operation, "Acquired run lock");

        Ok(Self {
            path: lock_path.to_path_buf(),
            file,
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
