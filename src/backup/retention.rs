//! Retention enforcement
//!
//! A sweep runs in two phases:
//!
//! 1. Count retention: each tier keeps its newest `keep` sets. A tier whose
//!    keep count is below `min_keep` is left alone with a warning.
//! 2. Pressure eviction: while filesystem usage is at or above the
//!    threshold, the globally oldest set among tiers still above `min_keep`
//!    is removed and usage is measured again.
//!
//! A dry run plans the same deletions without touching anything, projecting
//! usage by subtracting the bytes it would have freed.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;

use serde::Serialize;

use super::inventory::{scan_tier, SetEntry};
use crate::config::{EnginePaths, RetentionPolicy};
use crate::error::{EngineError, EngineResult};
use crate::models::Tier;
use crate::storage::StorageProbe;

/// Why a set was selected for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionReason {
    /// Beyond the tier's keep count
    Count,
    /// Evicted under storage pressure
    Pressure,
}

/// A set removed (or, in a dry run, selected for removal)
#[derive(Debug, Clone, Serialize)]
pub struct DeletedSet {
    pub name: String,
    pub tier: Tier,
    pub bytes_freed: u64,
    pub reason: DeletionReason,
}

/// Knobs for one sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Plan only
    pub dry_run: bool,
    /// Reduce every tier to `min_keep`, ignoring keep counts
    pub force: bool,
    /// Restrict count retention to one tier
    pub tier: Option<Tier>,
}

/// What a sweep did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub dry_run: bool,
    pub deleted: Vec<DeletedSet>,
    pub warnings: Vec<String>,
    /// Usage after the sweep (projected in a dry run); `None` if unmeasurable
    pub final_usage_percent: Option<f64>,
}

impl RetentionReport {
    /// Deletions per tier: names and bytes freed
    pub fn by_tier(&self) -> BTreeMap<Tier, (Vec<&str>, u64)> {
        let mut tiers: BTreeMap<Tier, (Vec<&str>, u64)> = BTreeMap::new();
        for set in &self.deleted {
            let slot = tiers.entry(set.tier).or_default();
            slot.0.push(&set.name);
            slot.1 += set.bytes_freed;
        }
        tiers
    }

    pub fn bytes_freed(&self) -> u64 {
        self.deleted.iter().map(|d| d.bytes_freed).sum()
    }

    pub fn emergency_count(&self) -> usize {
        self.deleted
            .iter()
            .filter(|d| d.reason == DeletionReason::Pressure)
            .count()
    }

    /// Notification subject line
    pub fn subject(&self) -> String {
        let prefix = if self.dry_run { "[dry run] " } else { "" };
        if self.warnings.is_empty() {
            format!("{}Backup cleanup complete: {} set(s) removed", prefix, self.deleted.len())
        } else {
            format!(
                "{}Backup cleanup finished with {} warning(s)",
                prefix,
                self.warnings.len()
            )
        }
    }

    /// Plain-text notification body
    pub fn render(&self) -> String {
        let mut body = String::new();
        let verb = if self.dry_run { "Would remove" } else { "Removed" };

        if self.deleted.is_empty() {
            let _ = writeln!(body, "No backup sets removed.");
        }

        for (tier, (names, bytes)) in self.by_tier() {
            let _ = writeln!(body, "{} {} {} set(s), {} bytes:", verb, names.len(), tier, bytes);
            for name in names {
                let _ = writeln!(body, "  - {}", name);
            }
        }

        if self.emergency_count() > 0 {
            let _ = writeln!(
                body,
                "{} set(s) evicted under storage pressure.",
                self.emergency_count()
            );
        }

        for warning in &self.warnings {
            let _ = writeln!(body, "WARNING: {}", warning);
        }

        match self.final_usage_percent {
            Some(p) => {
                let _ = writeln!(body, "Storage usage: {:.1}%", p);
            }
            None => {
                let _ = writeln!(body, "Storage usage: unknown");
            }
        }

        body
    }
}

/// Applies a [`RetentionPolicy`] to the sets under a backup root
pub struct RetentionManager<'a> {
    paths: &'a EnginePaths,
    policy: &'a RetentionPolicy,
    probe: &'a dyn StorageProbe,
}

impl<'a> RetentionManager<'a> {
    pub fn new(
        paths: &'a EnginePaths,
        policy: &'a RetentionPolicy,
        probe: &'a dyn StorageProbe,
    ) -> Self {
        Self {
            paths,
            policy,
            probe,
        }
    }

    /// Run count retention, then pressure eviction
    ///
    /// Policy breaches and individual deletion failures become warnings in
    /// the report; only a failure to scan the backup root is an error.
    pub fn sweep(&self, options: SweepOptions) -> EngineResult<RetentionReport> {
        let mut report = RetentionReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let mut remaining: BTreeMap<Tier, Vec<SetEntry>> = BTreeMap::new();
        for tier in Tier::ALL {
            remaining.insert(tier, scan_tier(self.paths, tier)?);
        }

        for tier in Tier::ALL {
            if options.tier.is_some_and(|only| only != tier) {
                continue;
            }
            if let Some(sets) = remaining.get_mut(&tier) {
                self.enforce_count(tier, sets, options, &mut report);
            }
        }

        self.relieve_pressure(&mut remaining, options, &mut report);

        tracing::info!(
            deleted = report.deleted.len(),
            bytes_freed = report.bytes_freed(),
            warnings = report.warnings.len(),
            dry_run = options.dry_run,
            "Retention sweep finished"
        );
        Ok(report)
    }

    fn enforce_count(
        &self,
        tier: Tier,
        sets: &mut Vec<SetEntry>,
        options: SweepOptions,
        report: &mut RetentionReport,
    ) {
        let min_keep = self.policy.min_keep as usize;
        let keep = if options.force {
            min_keep
        } else {
            match self.policy.keep_count(tier) {
                Some(k) => k as usize,
                None => return,
            }
        };

        if sets.len() <= keep {
            return;
        }

        if keep < min_keep {
            let violation = EngineError::PolicyViolation(format!(
                "{} keep count {} is below min_keep {}; skipping count retention for {} ({} sets)",
                tier,
                keep,
                min_keep,
                tier,
                sets.len()
            ));
            tracing::warn!(%tier, "{}", violation);
            report.warnings.push(violation.to_string());
            return;
        }

        let excess = sets.len() - keep;
        let candidates: Vec<SetEntry> = sets.drain(..excess).collect();
        for set in candidates {
            if let Err((set, e)) = self.delete(set, DeletionReason::Count, options.dry_run, report) {
                report.warnings.push(e.to_string());
                // Still on disk; it keeps its place as the oldest
                sets.insert(0, set);
            }
        }
    }

    fn relieve_pressure(
        &self,
        remaining: &mut BTreeMap<Tier, Vec<SetEntry>>,
        options: SweepOptions,
        report: &mut RetentionReport,
    ) {
        let root = self.paths.backup_root();
        let threshold = self.policy.storage_threshold_percent;
        let min_keep = self.policy.min_keep as usize;

        // A dry run measures once and projects from there
        let baseline = if options.dry_run {
            match self.probe.usage(root) {
                Ok(usage) => Some(usage),
                Err(e) => {
                    report.warnings.push(format!("Could not measure storage usage: {}", e));
                    return;
                }
            }
        } else {
            None
        };

        // Sets that failed to delete are excluded so the loop always progresses
        let mut stuck: Vec<String> = Vec::new();

        loop {
            let percent = match baseline {
                Some(usage) => usage.projected_percent(report.bytes_freed()),
                None => match self.probe.usage(root) {
                    Ok(usage) => usage.used_percent(),
                    Err(e) => {
                        report.warnings.push(format!("Could not measure storage usage: {}", e));
                        return;
                    }
                },
            };
            report.final_usage_percent = Some(percent);

            if percent < threshold {
                return;
            }

            let oldest = remaining
                .iter()
                .filter(|(_, sets)| sets.len() > min_keep)
                .filter_map(|(tier, sets)| {
                    sets.iter()
                        .position(|s| !stuck.contains(&s.name))
                        .map(|idx| (*tier, idx, &sets[idx]))
                })
                .min_by(|(_, _, a), (_, _, b)| {
                    a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name))
                })
                .map(|(tier, idx, _)| (tier, idx));

            let Some((tier, idx)) = oldest else {
                let message = format!(
                    "Storage usage {:.1}% is at or above the {:.1}% threshold but no set can be evicted without breaching min_keep {}",
                    percent, threshold, min_keep
                );
                tracing::warn!("{}", message);
                report.warnings.push(message);
                return;
            };

            let Some(sets) = remaining.get_mut(&tier) else {
                return;
            };
            let set = sets.remove(idx);
            tracing::warn!(set = %set.name, usage = percent, "Evicting under storage pressure");

            if let Err((set, e)) = self.delete(set, DeletionReason::Pressure, options.dry_run, report) {
                report.warnings.push(e.to_string());
                stuck.push(set.name.clone());
                sets.insert(idx, set);
            }
        }
    }

    /// Remove a set's archive and manifest, recording it in the report
    ///
    /// Hands the set back on failure.
    fn delete(
        &self,
        set: SetEntry,
        reason: DeletionReason,
        dry_run: bool,
        report: &mut RetentionReport,
    ) -> Result<(), (SetEntry, EngineError)> {
        if !dry_run {
            if let Err(e) = delete_set_files(&set) {
                tracing::error!(set = %set.name, error = %e, "Failed to delete set");
                return Err((set, e));
            }
            tracing::info!(set = %set.name, tier = %set.tier, ?reason, "Deleted set");
        }

        report.deleted.push(DeletedSet {
            name: set.name,
            tier: set.tier,
            bytes_freed: set.footprint_bytes,
            reason,
        });
        Ok(())
    }
}

fn delete_set_files(set: &SetEntry) -> EngineResult<()> {
    fs::remove_file(&set.archive_path).map_err(|e| {
        EngineError::Io(format!("Failed to delete {}: {}", set.archive_path.display(), e))
    })?;

    match fs::remove_file(&set.manifest_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::Io(format!(
            "Failed to delete {}: {}",
            set.manifest_path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::inventory::testing::fake_set;
    use crate::storage::disk::testing::ScriptedProbe;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (EnginePaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = EnginePaths::new(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        (paths, temp_dir)
    }

    fn names(paths: &EnginePaths, tier: Tier) -> Vec<String> {
        scan_tier(paths, tier)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    fn policy(daily: u32, min_keep: u32) -> RetentionPolicy {
        RetentionPolicy {
            daily,
            min_keep,
            ..RetentionPolicy::default()
        }
    }

    fn snapshot_tree(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().display().to_string(), fs::read(e.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_count_retention_keeps_newest() {
        let (paths, _temp) = setup();
        fake_set(&paths, Tier::Daily, "daily_t1", 300, 10);
        fake_set(&paths, Tier::Daily, "daily_t2", 200, 10);
        fake_set(&paths, Tier::Daily, "daily_t3", 100, 10);

        let policy = policy(2, 1);
        let probe = ScriptedProbe::new(&[10.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert_eq!(names(&paths, Tier::Daily), vec!["daily_t2", "daily_t3"]);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].name, "daily_t1");
        assert_eq!(report.deleted[0].reason, DeletionReason::Count);

        // Manifest goes with the archive
        assert!(!paths.tier_dir(Tier::Daily).join("daily_t1.manifest").exists());
    }

    #[test]
    fn test_keep_below_min_keep_skips_tier() {
        let (paths, _temp) = setup();
        for i in 0..5 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
        }

        let policy = policy(1, 3);
        let probe = ScriptedProbe::new(&[10.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert_eq!(names(&paths, Tier::Daily).len(), 5);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Policy violation"));
    }

    #[test]
    fn test_tiers_are_independent() {
        let (paths, _temp) = setup();
        for i in 0..3 {
            fake_set(&paths, Tier::Weekly, &format!("weekly_{}", i), 100 - i, 10);
            fake_set(&paths, Tier::Monthly, &format!("monthly_{}", i), 100 - i, 10);
        }

        let policy = RetentionPolicy {
            weekly: 2,
            monthly: 3,
            min_keep: 1,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[10.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert_eq!(names(&paths, Tier::Weekly), vec!["weekly_1", "weekly_2"]);
        assert_eq!(names(&paths, Tier::Monthly).len(), 3);
    }

    #[test]
    fn test_manual_tier_unlimited_by_default() {
        let (paths, _temp) = setup();
        for i in 0..12 {
            fake_set(&paths, Tier::Manual, &format!("manual_{:02}", i), 100 - i, 10);
        }

        let policy = RetentionPolicy::default();
        let probe = ScriptedProbe::new(&[10.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert_eq!(names(&paths, Tier::Manual).len(), 12);
    }

    #[test]
    fn test_pressure_evicts_until_below_threshold() {
        let (paths, _temp) = setup();
        for i in 0..4 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
        }

        let policy = RetentionPolicy {
            min_keep: 3,
            storage_threshold_percent: 85.0,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[90.0, 80.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].name, "daily_0");
        assert_eq!(report.deleted[0].reason, DeletionReason::Pressure);
        assert_eq!(report.final_usage_percent, Some(80.0));
        assert!(report.warnings.is_empty());
        assert_eq!(names(&paths, Tier::Daily).len(), 3);
    }

    #[test]
    fn test_pressure_respects_min_keep_and_warns() {
        let (paths, _temp) = setup();
        for i in 0..3 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
            fake_set(&paths, Tier::Weekly, &format!("weekly_{}", i), 50 - i, 10);
        }

        let policy = RetentionPolicy {
            min_keep: 2,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[99.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        // Oldest overall first (daily_0), then weekly_0
        let deleted: Vec<_> = report.deleted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deleted, vec!["daily_0", "weekly_0"]);
        assert_eq!(names(&paths, Tier::Daily).len(), 2);
        assert_eq!(names(&paths, Tier::Weekly).len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("no set can be evicted"));
    }

    #[test]
    fn test_no_tier_ever_below_min_keep() {
        let (paths, _temp) = setup();
        for tier in Tier::ALL {
            for i in 0..4 {
                fake_set(&paths, tier, &format!("{}_{}", tier, i), 1000 - i * 10, 10);
            }
        }

        let policy = RetentionPolicy {
            daily: 0,
            weekly: 1,
            monthly: 2,
            manual: Some(0),
            min_keep: 2,
            storage_threshold_percent: 50.0,
        };
        let probe = ScriptedProbe::new(&[100.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        for tier in Tier::ALL {
            assert_eq!(names(&paths, tier).len(), 2, "{}", tier);
        }
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (paths, temp) = setup();
        for i in 0..5 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10_000);
        }
        let before = snapshot_tree(temp.path());

        let policy = RetentionPolicy {
            daily: 3,
            min_keep: 1,
            storage_threshold_percent: 50.0,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[52.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(before, snapshot_tree(temp.path()));

        // Two go by count; freeing ~20 KB of the 1 MB probe projects just
        // under 50%, so pressure eviction has nothing to add
        assert_eq!(report.deleted.len(), 2);
        assert!(report.deleted.iter().all(|d| d.reason == DeletionReason::Count));
        assert!(report.final_usage_percent.unwrap() < 50.0);
        assert_eq!(*probe.calls.borrow(), 1);
        assert!(report.render().contains("Would remove 2 daily set(s)"));
    }

    #[test]
    fn test_dry_run_projects_pressure() {
        let (paths, _temp) = setup();
        for i in 0..4 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 100_000);
        }

        let policy = RetentionPolicy {
            min_keep: 1,
            storage_threshold_percent: 85.0,
            ..RetentionPolicy::default()
        };
        // 100 KB sets on a 1 MB probe: 96% -> ~86% -> ~76%
        let probe = ScriptedProbe::new(&[96.0]);
        let report = RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.emergency_count(), 2);
        assert_eq!(names(&paths, Tier::Daily).len(), 4);
    }

    #[test]
    fn test_force_reduces_to_min_keep() {
        let (paths, _temp) = setup();
        for i in 0..5 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
            fake_set(&paths, Tier::Manual, &format!("manual_{}", i), 100 - i, 10);
        }

        let policy = RetentionPolicy {
            min_keep: 2,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[10.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions {
                force: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(names(&paths, Tier::Daily), vec!["daily_3", "daily_4"]);
        assert_eq!(names(&paths, Tier::Manual), vec!["manual_3", "manual_4"]);
    }

    #[test]
    fn test_single_tier_sweep() {
        let (paths, _temp) = setup();
        for i in 0..5 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
            fake_set(&paths, Tier::Weekly, &format!("weekly_{}", i), 100 - i, 10);
        }

        let policy = RetentionPolicy {
            daily: 2,
            weekly: 2,
            min_keep: 1,
            ..RetentionPolicy::default()
        };
        let probe = ScriptedProbe::new(&[10.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions {
                tier: Some(Tier::Weekly),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(names(&paths, Tier::Daily).len(), 5);
        assert_eq!(names(&paths, Tier::Weekly).len(), 2);
    }

    #[test]
    fn test_partial_files_never_deleted() {
        let (paths, _temp) = setup();
        let partial = paths.tier_dir(Tier::Daily).join("daily_x.tar.zst.partial");
        fs::write(&partial, b"in progress").unwrap();
        for i in 0..3 {
            fake_set(&paths, Tier::Daily, &format!("daily_{}", i), 100 - i, 10);
        }

        let policy = policy(1, 1);
        let probe = ScriptedProbe::new(&[10.0]);
        RetentionManager::new(&paths, &policy, &probe)
            .sweep(SweepOptions::default())
            .unwrap();

        assert!(partial.exists());
        assert_eq!(names(&paths, Tier::Daily), vec!["daily_2"]);
    }

    #[test]
    fn test_report_render() {
        let report = RetentionReport {
            dry_run: false,
            deleted: vec![DeletedSet {
                name: "daily_a".into(),
                tier: Tier::Daily,
                bytes_freed: 2048,
                reason: DeletionReason::Pressure,
            }],
            warnings: vec!["something odd".into()],
            final_usage_percent: Some(70.25),
        };

        let body = report.render();
        assert!(body.contains("Removed 1 daily set(s), 2048 bytes"));
        assert!(body.contains("  - daily_a"));
        assert!(body.contains("1 set(s) evicted under storage pressure"));
        assert!(body.contains("WARNING: something odd"));
        assert!(body.contains("70.2%") || body.contains("70.3%"));
        assert!(report.subject().contains("1 warning"));
    }
}
