//! Snapshot assembly
//!
//! Copies every registered domain into a private staging directory that the
//! archive builder then packs. Live data is only ever read here. The staging
//! directory is a [`TempDir`], so it disappears however the run ends.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::config::DomainSpec;
use crate::error::{EngineError, EngineResult};
use crate::integrations::CacheStore;
use crate::storage::copy_tree;
use crate::storage::file_io::{render_key_values, write_atomic};

/// Name of the manifest written into the staging root (and so into the archive)
pub const STAGED_MANIFEST: &str = "backup-manifest.txt";

/// Staging key of the cache-store dump
pub const CACHE_DOMAIN: &str = "cache";

/// A staged copy of every reachable domain
#[derive(Debug)]
pub struct Snapshot {
    staging: TempDir,
    created_at: DateTime<Utc>,
    included: Vec<String>,
    omitted: Vec<String>,
}

impl Snapshot {
    /// Root of the staging area
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    /// When staging started
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Domains copied into staging, in registration order
    pub fn included(&self) -> &[String] {
        &self.included
    }

    /// Optional domains that were absent, plus a failed cache dump
    pub fn omitted(&self) -> &[String] {
        &self.omitted
    }
}

/// Name of the machine the snapshot was taken on
pub(crate) fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Stage every domain under `staging_parent`
///
/// Processes `domains` in order. A missing required domain aborts with a
/// configuration error; a missing optional one is recorded as omitted. When a
/// cache store is given its dump is staged as [`CACHE_DOMAIN`]; a failed or
/// timed-out dump is only an omission.
pub fn assemble(
    domains: &[DomainSpec],
    cache: Option<&dyn CacheStore>,
    staging_parent: &Path,
) -> EngineResult<Snapshot> {
    std::fs::create_dir_all(staging_parent).map_err(|e| {
        EngineError::Io(format!(
            "Failed to create {}: {}",
            staging_parent.display(),
            e
        ))
    })?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(staging_parent)
        .map_err(|e| EngineError::Io(format!("Failed to create staging directory: {}", e)))?;

    let mut snapshot = Snapshot {
        staging,
        created_at: Utc::now(),
        included: Vec::new(),
        omitted: Vec::new(),
    };

    for domain in domains {
        if !domain.source_path.exists() {
            if domain.required {
                return Err(EngineError::Config(format!(
                    "Required domain '{}' is missing: {}",
                    domain.identifier,
                    domain.source_path.display()
                )));
            }
            tracing::warn!(
                domain = %domain.identifier,
                source = %domain.source_path.display(),
                "Optional domain missing, skipping"
            );
            snapshot.omitted.push(domain.identifier.clone());
            continue;
        }

        let target = snapshot.path().join(&domain.identifier);
        let bytes = copy_tree(&domain.source_path, &target)?;
        tracing::info!(domain = %domain.identifier, bytes, "Staged domain");
        snapshot.included.push(domain.identifier.clone());
    }

    if let Some(store) = cache {
        match stage_cache_dump(store, snapshot.path()) {
            Ok(bytes) => {
                tracing::info!(bytes, "Staged cache dump");
                snapshot.included.push(CACHE_DOMAIN.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache dump unavailable, continuing without it");
                snapshot.omitted.push(CACHE_DOMAIN.to_string());
            }
        }
    }

    write_staged_manifest(&snapshot)?;
    Ok(snapshot)
}

fn stage_cache_dump(store: &dyn CacheStore, staging: &Path) -> EngineResult<u64> {
    let dump: PathBuf = store.dump()?;
    copy_tree(&dump, &staging.join(CACHE_DOMAIN))
}

fn write_staged_manifest(snapshot: &Snapshot) -> EngineResult<()> {
    let mut lines = vec![
        ("created_at", snapshot.created_at.to_rfc3339()),
        ("hostname", host_name()),
    ];
    lines.extend(snapshot.included.iter().map(|d| ("domain", d.clone())));
    lines.extend(snapshot.omitted.iter().map(|d| ("omitted", d.clone())));

    write_atomic(
        snapshot.path().join(STAGED_MANIFEST),
        render_key_values(lines).as_bytes(),
    )
}
