use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use backup_lifecycle::backup::{RestoreOptions, SweepOptions};
use backup_lifecycle::cli::{
    handle_cleanup_command, handle_config_command, handle_create_command, handle_history_command,
    handle_list_command, handle_restore_command, handle_status_command, handle_verify_command,
};
use backup_lifecycle::config::paths::DEFAULT_CONFIG_PATH;
use backup_lifecycle::config::Settings;
use backup_lifecycle::models::Tier;

#[derive(Parser)]
#[command(
    name = "backupctl",
    version,
    about = "Backup lifecycle and retention engine",
    long_about = "backupctl snapshots the data domains of a self-hosted workflow-automation \
                  server into tiered, verified archives, keeps storage under control with \
                  count and pressure based retention, and restores safely with a \
                  pre-restore safety snapshot."
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "BACKUP_LIFECYCLE_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot, archive and verify a new backup set
    Create {
        /// Tier: daily, weekly, monthly or manual
        tier: Tier,
        /// Label used instead of a timestamp in the set name
        name: Option<String>,
        /// Prompt for the passphrase if none is configured
        #[arg(long)]
        ask_passphrase: bool,
    },

    /// List backup sets
    #[command(alias = "ls")]
    List {
        /// Tier to list, or "all"
        #[arg(default_value = "all")]
        tier: String,
    },

    /// Check that archives are complete and readable
    Verify {
        /// Set name, archive path, or "all"
        target: String,
        /// Prompt for the passphrase if none is configured
        #[arg(long)]
        ask_passphrase: bool,
    },

    /// Apply the retention policy
    Cleanup {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// Reduce every tier to the minimum keep count
        #[arg(long)]
        force: bool,
        /// Only apply count retention to this tier
        #[arg(long)]
        tier: Option<Tier>,
    },

    /// Restore live data from a backup set
    Restore {
        /// Set name or archive path
        target: String,
        /// Show what would be restored without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Do not restart dependent services afterwards
        #[arg(long)]
        skip_services: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Prompt for the passphrase if none is configured
        #[arg(long)]
        ask_passphrase: bool,
    },

    /// Show the last run, tier totals and storage usage
    Status,

    /// Show recent journal entries
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the resolved configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_or_create(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    backup_lifecycle::logging::init(&settings.log_level);

    match cli.command {
        Commands::Create {
            tier,
            name,
            ask_passphrase,
        } => handle_create_command(&settings, tier, name.as_deref(), ask_passphrase)?,
        Commands::List { tier } => handle_list_command(&settings, &tier)?,
        Commands::Verify {
            target,
            ask_passphrase,
        } => handle_verify_command(&settings, &target, ask_passphrase)?,
        Commands::Cleanup {
            dry_run,
            force,
            tier,
        } => handle_cleanup_command(
            &settings,
            SweepOptions {
                dry_run,
                force,
                tier,
            },
        )?,
        Commands::Restore {
            target,
            dry_run,
            skip_services,
            yes,
            ask_passphrase,
        } => handle_restore_command(
            &settings,
            &target,
            RestoreOptions {
                dry_run,
                skip_service_restart: skip_services,
            },
            yes,
            ask_passphrase,
        )?,
        Commands::Status => handle_status_command(&settings)?,
        Commands::History { limit } => handle_history_command(&settings, limit)?,
        Commands::Config => handle_config_command(&settings, &cli.config)?,
    }

    Ok(())
}
