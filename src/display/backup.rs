//! Backup set display formatting
//!
//! Formats inventories, the last run and journal history for the terminal.

use chrono::Utc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::audit::JournalEntry;
use crate::backup::Inventory;
use crate::models::RunState;

#[derive(Tabled)]
struct SetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Encrypted")]
    encrypted: &'static str,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Domains")]
    domains: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Set")]
    set: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

/// Format the inventory as a table followed by per-tier totals
pub fn format_set_list(inventory: &Inventory) -> String {
    if inventory.is_empty() {
        return "No backup sets found.".to_string();
    }

    let now = Utc::now();
    let rows: Vec<SetRow> = inventory
        .sets
        .iter()
        .map(|s| SetRow {
            name: s.name.clone(),
            tier: s.tier.to_string(),
            created: s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            age: format_duration(now.signed_duration_since(s.created_at)),
            size: format_size(s.size_bytes),
            encrypted: if s.encrypted { "yes" } else { "no" },
            host: s.hostname.clone().unwrap_or_else(|| "-".to_string()),
            domains: if s.domains.is_empty() {
                "-".to_string()
            } else {
                s.domains.join(", ")
            },
        })
        .collect();

    let mut output = Table::new(rows).with(Style::psql()).to_string();
    output.push_str("\n\n");

    for (tier, (count, bytes)) in inventory.totals() {
        output.push_str(&format!(
            "{:<8} {:>3} set(s)  {}\n",
            tier.to_string(),
            count,
            format_size(bytes)
        ));
    }
    output.push_str(&format!(
        "Total: {} set(s), {}",
        inventory.sets.len(),
        format_size(inventory.total_size())
    ));

    output
}

/// Format the last-run record
pub fn format_run_state(state: Option<&RunState>) -> String {
    let Some(state) = state else {
        return "No backup has run yet.".to_string();
    };

    let age = format_duration(Utc::now().signed_duration_since(state.time));
    let archive = state
        .archive_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());

    format!(
        "Last backup\n\
         ===========\n\
         Time:         {} ({} ago)\n\
         Tier:         {}\n\
         Archive:      {}\n\
         Size:         {}\n\
         Verification: {}",
        state.time.format("%Y-%m-%d %H:%M:%S UTC"),
        age,
        state.tier,
        archive,
        format_size(state.size_bytes),
        state.verification_status,
    )
}

/// Format journal entries, newest last
pub fn format_history(entries: &[JournalEntry]) -> String {
    if entries.is_empty() {
        return "No journal entries.".to_string();
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            time: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            event: e.event.to_string(),
            set: e.set_name.clone().unwrap_or_else(|| "-".to_string()),
            summary: e.summary.clone(),
        })
        .collect();

    Table::new(rows).with(Style::psql()).to_string()
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::SetSummary;
    use crate::models::{Tier, VerificationStatus};
    use std::path::PathBuf;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_duration(chrono::Duration::hours(3)), "3h");
        assert_eq!(format_duration(chrono::Duration::days(2)), "2d");
        assert_eq!(format_duration(chrono::Duration::days(65)), "2mo");
    }

    #[test]
    fn test_set_list_includes_totals() {
        let inventory = Inventory {
            sets: vec![
                SetSummary {
                    name: "daily_a".into(),
                    tier: Tier::Daily,
                    created_at: Utc::now(),
                    size_bytes: 2048,
                    encrypted: false,
                    hostname: Some("backup-host".into()),
                    domains: vec!["n8n".into(), "postgres".into()],
                    archive_path: PathBuf::from("/b/daily/daily_a.tar.zst"),
                },
                SetSummary {
                    name: "manual_b".into(),
                    tier: Tier::Manual,
                    created_at: Utc::now(),
                    size_bytes: 1024,
                    encrypted: true,
                    hostname: None,
                    domains: Vec::new(),
                    archive_path: PathBuf::from("/b/manual/manual_b.tar.zst.enc"),
                },
            ],
        };

        let output = format_set_list(&inventory);
        assert!(output.contains("daily_a"));
        assert!(output.contains("manual_b"));
        assert!(output.contains("backup-host"));
        assert!(output.contains("n8n, postgres"));
        assert!(output.contains("Total: 2 set(s), 3.0 KB"));
    }

    #[test]
    fn test_empty_views() {
        assert_eq!(format_set_list(&Inventory::default()), "No backup sets found.");
        assert_eq!(format_run_state(None), "No backup has run yet.");
        assert_eq!(format_history(&[]), "No journal entries.");
    }

    #[test]
    fn test_run_state_without_archive() {
        let state = RunState {
            time: Utc::now(),
            tier: Tier::Weekly,
            archive_path: None,
            size_bytes: 0,
            verification_status: VerificationStatus::Failed,
        };
        let output = format_run_state(Some(&state));
        assert!(output.contains("weekly"));
        assert!(output.contains("(none)"));
        assert!(output.contains("failed"));
    }
}
