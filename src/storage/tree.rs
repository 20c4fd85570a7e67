//! Directory tree copies with metadata preservation
//!
//! Used for staging live domains, for safety snapshots and for putting
//! restored data back in place. Permissions and modification times are
//! carried over where the filesystem allows it.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};

/// Copy a file or a whole directory tree to `dst`
///
/// A file source lands at `dst` itself; a directory source is recreated as
/// `dst`. Symlinks are copied as links, never followed. Returns the number
/// of file bytes copied.
pub fn copy_tree(src: &Path, dst: &Path) -> EngineResult<u64> {
    let metadata = fs::symlink_metadata(src).map_err(|e| {
        EngineError::Io(format!("Failed to stat {}: {}", src.display(), e))
    })?;

    if !metadata.is_dir() {
        if let Some(parent) = dst.parent() {
            create_dir(parent)?;
        }
        return copy_entry(src, dst, &metadata);
    }

    let mut copied = 0u64;
    let mut directories = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            EngineError::Io(format!("Failed to walk {}: {}", src.display(), e))
        })?;

        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        let entry_meta = entry.metadata().map_err(|e| {
            EngineError::Io(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;

        if entry.file_type().is_dir() {
            create_dir(&target)?;
            directories.push((target, entry_meta));
        } else {
            copied += copy_entry(entry.path(), &target, &entry_meta)?;
        }
    }

    // Deepest first so read-only parents don't block their children
    for (dir, meta) in directories.into_iter().rev() {
        let _ = fs::set_permissions(&dir, meta.permissions());
    }

    Ok(copied)
}

fn create_dir(path: &Path) -> EngineResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| EngineError::Io(format!("Failed to create {}: {}", path.display(), e)))
}

fn copy_entry(src: &Path, dst: &Path, metadata: &fs::Metadata) -> EngineResult<u64> {
    if metadata.file_type().is_symlink() {
        copy_symlink(src, dst)?;
        return Ok(0);
    }

    copy_file_preserving(src, dst, metadata)
        .map_err(|e| EngineError::Io(format!("Failed to copy {}: {}", src.display(), e)))
}

fn copy_file_preserving(src: &Path, dst: &Path, metadata: &fs::Metadata) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dst)?;
    let copied = io::copy(&mut reader, &mut writer)?;

    if let Ok(modified) = metadata.modified() {
        if let Err(e) = writer.set_modified(modified) {
            tracing::debug!(path = %dst.display(), error = %e, "Could not preserve mtime");
        }
    }
    drop(writer);

    if let Err(e) = fs::set_permissions(dst, metadata.permissions()) {
        tracing::debug!(path = %dst.display(), error = %e, "Could not preserve permissions");
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> EngineResult<()> {
    let target = fs::read_link(src)
        .map_err(|e| EngineError::Io(format!("Failed to read link {}: {}", src.display(), e)))?;
    std::os::unix::fs::symlink(&target, dst)
        .map_err(|e| EngineError::Io(format!("Failed to create link {}: {}", dst.display(), e)))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> EngineResult<()> {
    tracing::warn!(path = %src.display(), "Skipping symlink");
    Ok(())
}

/// Remove a file or directory tree; a missing path is not an error
pub fn remove_path(path: &Path) -> EngineResult<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };

    result.map_err(|e| EngineError::Io(format!("Failed to remove {}: {}", path.display(), e)))
}
