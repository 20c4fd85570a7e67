//! Read-only view of the sets on disk
//!
//! Sets are discovered by scanning each tier directory for finished
//! archives. `.partial` files left by an interrupted run and manifests
//! without an archive are never treated as sets.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::archive::SetManifest;
use crate::config::EnginePaths;
use crate::error::{EngineError, EngineResult};
use crate::models::backup_set::{manifest_file_name, parse_archive_file_name};
use crate::models::{RunState, Tier};

/// A set as found on disk
#[derive(Debug, Clone)]
pub struct SetEntry {
    pub name: String,
    pub tier: Tier,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub encrypted: bool,
    /// Archive size in bytes
    pub size_bytes: u64,
    /// Bytes released by deleting the set (archive plus manifest)
    pub footprint_bytes: u64,
    pub modified: SystemTime,
}

/// Scan one tier, oldest first
///
/// Ordered by archive mtime, ties broken by name.
pub fn scan_tier(paths: &EnginePaths, tier: Tier) -> EngineResult<Vec<SetEntry>> {
    let dir = paths.tier_dir(tier);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let read_dir = fs::read_dir(&dir)
        .map_err(|e| EngineError::Io(format!("Failed to read {}: {}", dir.display(), e)))?;

    let mut sets = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| {
            EngineError::Io(format!("Failed to read directory entry: {}", e))
        })?;

        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((name, encrypted)) = parse_archive_file_name(&file_name) else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };

        let manifest_path = dir.join(manifest_file_name(&name));
        let manifest_bytes = fs::metadata(&manifest_path).map(|m| m.len()).unwrap_or(0);

        sets.push(SetEntry {
            name,
            tier,
            archive_path: entry.path(),
            manifest_path,
            encrypted,
            size_bytes: metadata.len(),
            footprint_bytes: metadata.len() + manifest_bytes,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    sets.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(sets)
}

/// One row of the inventory listing
#[derive(Debug, Clone, Serialize)]
pub struct SetSummary {
    pub name: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub encrypted: bool,
    /// Host the set was taken on, from the manifest
    pub hostname: Option<String>,
    /// Domains in the set, from the manifest
    pub domains: Vec<String>,
    pub archive_path: PathBuf,
}

/// Sets grouped by tier, oldest first within each tier
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub sets: Vec<SetSummary>,
}

impl Inventory {
    pub fn count(&self, tier: Tier) -> usize {
        self.sets.iter().filter(|s| s.tier == tier).count()
    }

    pub fn size(&self, tier: Tier) -> u64 {
        self.sets
            .iter()
            .filter(|s| s.tier == tier)
            .map(|s| s.size_bytes)
            .sum()
    }

    pub fn total_size(&self) -> u64 {
        self.sets.iter().map(|s| s.size_bytes).sum()
    }

    /// Per-tier `(count, bytes)` for tiers holding at least one set
    pub fn totals(&self) -> BTreeMap<Tier, (usize, u64)> {
        let mut totals = BTreeMap::new();
        for set in &self.sets {
            let slot = totals.entry(set.tier).or_insert((0usize, 0u64));
            slot.0 += 1;
            slot.1 += set.size_bytes;
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// List sets in one tier or all of them
///
/// `created_at` comes from the manifest, falling back to archive mtime.
pub fn list_sets(paths: &EnginePaths, tier: Option<Tier>) -> EngineResult<Inventory> {
    let tiers: Vec<Tier> = match tier {
        Some(t) => vec![t],
        None => Tier::ALL.to_vec(),
    };

    let mut inventory = Inventory::default();
    for tier in tiers {
        for entry in scan_tier(paths, tier)? {
            let manifest = match SetManifest::load(&entry.manifest_path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(set = %entry.name, error = %e, "Unreadable manifest");
                    None
                }
            };
            let manifest = manifest.unwrap_or_default();
            let created_at = manifest
                .created_at
                .unwrap_or_else(|| DateTime::<Utc>::from(entry.modified));

            inventory.sets.push(SetSummary {
                name: entry.name,
                tier,
                created_at,
                size_bytes: entry.size_bytes,
                encrypted: entry.encrypted,
                hostname: manifest.hostname,
                domains: manifest.domains,
                archive_path: entry.archive_path,
            });
        }
    }

    Ok(inventory)
}

/// The last recorded run, if any
pub fn last_run(paths: &EnginePaths) -> EngineResult<Option<RunState>> {
    RunState::load(&paths.state_file())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    /// Drop a fake set (archive + manifest) with a fixed age and size
    pub fn fake_set(paths: &EnginePaths, tier: Tier, name: &str, age_secs: u64, size: usize) -> PathBuf {
        let dir = paths.tier_dir(tier);
        fs::create_dir_all(&dir).unwrap();

        let archive = dir.join(format!("{}.tar.zst", name));
        fs::write(&archive, vec![0u8; size]).unwrap();
        fs::write(
            dir.join(manifest_file_name(name)),
            format!("name={}\ntier={}\n", name, tier),
        )
        .unwrap();

        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&archive)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        archive
    }
}
