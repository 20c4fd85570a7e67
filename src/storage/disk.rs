//! Filesystem usage measurement
//!
//! The retention manager reads usage through [`StorageProbe`] so the pressure
//! loop can be driven by scripted readings in tests.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Capacity snapshot of the filesystem holding the backup root
///
/// `free_bytes` includes blocks reserved for root; `available_bytes` does
/// not. Percentages follow `df`: used over what an unprivileged writer can
/// ever reach, so the reserve never counts as usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    /// Bytes in use
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Bytes usable without the root reserve
    pub fn capacity_bytes(&self) -> u64 {
        self.used_bytes().saturating_add(self.available_bytes)
    }

    /// Usage as a percentage of usable capacity
    pub fn used_percent(&self) -> f64 {
        percent_of(self.used_bytes(), self.capacity_bytes())
    }

    /// Usage after `freed` more bytes are released
    pub fn projected_percent(&self, freed: u64) -> f64 {
        percent_of(self.used_bytes().saturating_sub(freed), self.capacity_bytes())
    }
}

fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}

/// Source of filesystem usage readings
pub trait StorageProbe {
    fn usage(&self, path: &Path) -> EngineResult<DiskUsage>;
}

/// Reads real capacity figures through statvfs
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl StorageProbe for FsProbe {
    fn usage(&self, path: &Path) -> EngineResult<DiskUsage> {
        let total_bytes = fs2::total_space(path).map_err(|e| {
            EngineError::Io(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        let free_bytes = fs2::free_space(path).map_err(|e| {
            EngineError::Io(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        let available_bytes = fs2::available_space(path).map_err(|e| {
            EngineError::Io(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        Ok(DiskUsage {
            total_bytes,
            free_bytes,
            available_bytes,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of usage percentages, repeating the last one
    pub struct ScriptedProbe {
        readings: RefCell<VecDeque<f64>>,
        last: RefCell<f64>,
        pub calls: RefCell<usize>,
    }

    impl ScriptedProbe {
        pub fn new(readings: &[f64]) -> Self {
            Self {
                readings: RefCell::new(readings.iter().copied().collect()),
                last: RefCell::new(readings.last().copied().unwrap_or(0.0)),
                calls: RefCell::new(0),
            }
        }
    }

    impl StorageProbe for ScriptedProbe {
        fn usage(&self, _path: &Path) -> EngineResult<DiskUsage> {
            *self.calls.borrow_mut() += 1;
            let percent = match self.readings.borrow_mut().pop_front() {
                Some(p) => {
                    *self.last.borrow_mut() = p;
                    p
                }
                None => *self.last.borrow(),
            };
            let total_bytes = 1_000_000u64;
            let used = (percent * total_bytes as f64 / 100.0).round() as u64;
            Ok(DiskUsage {
                total_bytes,
                free_bytes: total_bytes - used,
                available_bytes: total_bytes - used,
            })
        }
    }
}
