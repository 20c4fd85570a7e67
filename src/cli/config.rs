//! Configuration CLI command

use std::path::Path;

use crate::config::Settings;
use crate::error::EngineResult;
use crate::models::Tier;

/// Show the resolved configuration
pub fn handle_config_command(settings: &Settings, config_path: &Path) -> EngineResult<()> {
    let paths = settings.paths();

    println!("Backup Lifecycle Configuration");
    println!("==============================");
    println!(
        "Config file:  {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("Backup root:  {}", paths.backup_root().display());
    println!("Journal:      {}", paths.journal_file().display());
    println!("Run state:    {}", paths.state_file().display());
    println!();

    println!("Domains:");
    if settings.domains.is_empty() {
        println!("  (none registered)");
    }
    for domain in &settings.domains {
        println!(
            "  {:<16} {}{}",
            domain.identifier,
            domain.source_path.display(),
            if domain.required { " [required]" } else { "" }
        );
    }
    println!();

    println!("Retention:");
    for tier in Tier::ALL {
        match settings.retention.keep_count(tier) {
            Some(keep) => println!("  {:<8} keep {}", tier.to_string(), keep),
            None => println!("  {:<8} unlimited", tier.to_string()),
        }
    }
    println!("  min keep {}", settings.retention.min_keep);
    println!(
        "  storage threshold {:.0}%",
        settings.retention.storage_threshold_percent
    );
    println!();

    println!("Settings:");
    println!("  Compression level:  {}", settings.compression_level);
    println!("  Encryption enabled: {}", settings.encryption.enabled);
    if settings.encryption.enabled {
        match &settings.encryption.passphrase_file {
            Some(file) => println!("  Passphrase file:    {}", file.display()),
            None => println!("  Passphrase env:     {}", settings.encryption.passphrase_env),
        }
    }
    match &settings.cache {
        Some(cache) => println!(
            "  Cache store:        {} (dump {})",
            cache.command.join(" "),
            cache.dump_path.display()
        ),
        None => println!("  Cache store:        (none)"),
    }
    if settings.notify.command.is_empty() {
        println!("  Notifications:      log only");
    } else {
        println!("  Notifications:      {}", settings.notify.command.join(" "));
    }
    if !settings.services.names.is_empty() {
        println!(
            "  Restart services:   {} via {}",
            settings.services.names.join(", "),
            settings.services.restart_command.join(" ")
        );
    }
    println!("  Log level:          {}", settings.log_level);

    Ok(())
}
