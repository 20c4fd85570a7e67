//! Engine settings
//!
//! Manages the registered data domains, retention policy, encryption,
//! cache-store and notification hooks. Settings are a JSON document where
//! every field has a default, so a partial file is always valid.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths::EnginePaths;
use crate::backup::snapshot::{CACHE_DOMAIN, STAGED_MANIFEST};
use crate::crypto::KeyDerivationParams;
use crate::error::EngineError;
use crate::models::Tier;

/// Environment variable overriding the backup root
pub const ROOT_ENV: &str = "BACKUP_LIFECYCLE_ROOT";

/// Newest settings layout this build understands
pub const SCHEMA_VERSION: u32 = 1;

/// A directory or file to snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Key under which the domain is staged and restored
    pub identifier: String,
    /// Live location of the data
    pub source_path: PathBuf,
    /// Abort the run when the source is missing
    #[serde(default)]
    pub required: bool,
}

impl DomainSpec {
    pub fn new(identifier: impl Into<String>, source_path: impl Into<PathBuf>, required: bool) -> Self {
        Self {
            identifier: identifier.into(),
            source_path: source_path.into(),
            required,
        }
    }
}

/// Backup retention settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Number of daily sets to keep
    #[serde(default = "default_daily")]
    pub daily: u32,
    /// Number of weekly sets to keep
    #[serde(default = "default_weekly")]
    pub weekly: u32,
    /// Number of monthly sets to keep
    #[serde(default = "default_monthly")]
    pub monthly: u32,
    /// Number of manual sets to keep (unlimited when unset)
    #[serde(default)]
    pub manual: Option<u32>,
    /// Floor no tier is reduced below, even under storage pressure
    #[serde(default = "default_min_keep")]
    pub min_keep: u32,
    /// Filesystem usage that triggers emergency eviction
    #[serde(default = "default_threshold")]
    pub storage_threshold_percent: f64,
}

fn default_daily() -> u32 {
    7
}

fn default_weekly() -> u32 {
    4
}

fn default_monthly() -> u32 {
    3
}

fn default_min_keep() -> u32 {
    2
}

fn default_threshold() -> f64 {
    85.0
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: default_daily(),
            weekly: default_weekly(),
            monthly: default_monthly(),
            manual: None,
            min_keep: default_min_keep(),
            storage_threshold_percent: default_threshold(),
        }
    }
}

impl RetentionPolicy {
    /// Keep-count for a tier; `None` means count retention never applies
    pub fn keep_count(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Daily => Some(self.daily),
            Tier::Weekly => Some(self.weekly),
            Tier::Monthly => Some(self.monthly),
            Tier::Manual => self.manual,
        }
    }
}

/// Encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Whether new archives are encrypted
    #[serde(default)]
    pub enabled: bool,

    /// Environment variable holding the passphrase
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,

    /// File holding the passphrase (first line), checked before the env var
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<PathBuf>,

    /// Argon2 memory cost in KiB
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,

    /// Argon2 iterations
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Argon2 lanes
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_passphrase_env() -> String {
    "BACKUP_LIFECYCLE_PASSPHRASE".to_string()
}

fn default_memory_cost() -> u32 {
    65536 // 64 MiB
}

fn default_time_cost() -> u32 {
    3
}

fn default_parallelism() -> u32 {
    4
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            passphrase_env: default_passphrase_env(),
            passphrase_file: None,
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
        }
    }
}

/// Key-value cache store that can dump itself on command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// CLI used to talk to the store, e.g. `["docker", "exec", "redis", "redis-cli"]`
    pub command: Vec<String>,
    /// Where the store writes its dump file
    pub dump_path: PathBuf,
    /// Maximum seconds to wait for the dump
    #[serde(default = "default_cache_timeout")]
    pub timeout_secs: u64,
}

fn default_cache_timeout() -> u64 {
    60
}

/// Notification sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifySettings {
    /// Program run with the subject as its last argument and the body on stdin
    #[serde(default)]
    pub command: Vec<String>,
}

/// Dependent services signalled after a restore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Program run with each service name appended, e.g. `["systemctl", "restart"]`
    #[serde(default)]
    pub restart_command: Vec<String>,
    /// Services to restart
    #[serde(default)]
    pub names: Vec<String>,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Directory holding every tier
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,

    /// Data domains in snapshot order
    #[serde(default)]
    pub domains: Vec<DomainSpec>,

    /// Retention policy
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Archive encryption
    #[serde(default)]
    pub encryption: EncryptionSettings,

    /// Optional cache store snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSettings>,

    /// Notification sink
    #[serde(default)]
    pub notify: NotifySettings,

    /// Services to signal after restore
    #[serde(default)]
    pub services: ServiceSettings,

    /// zstd compression level (1-22)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/var/backups/workflow")
}

fn default_compression_level() -> i32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_root: default_backup_root(),
            domains: Vec::new(),
            retention: RetentionPolicy::default(),
            encryption: EncryptionSettings::default(),
            cache: None,
            notify: NotifySettings::default(),
            services: ServiceSettings::default(),
            compression_level: default_compression_level(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    ///
    /// `BACKUP_LIFECYCLE_ROOT` overrides the backup root either way.
    pub fn load_or_create(path: &Path) -> Result<Self, EngineError> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                EngineError::Io(format!("Failed to read settings file: {}", e))
            })?;

            serde_json::from_str::<Settings>(&contents).map_err(|e| {
                EngineError::Config(format!("Failed to parse settings file: {}", e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            Settings::default()
        };

        if let Ok(root) = std::env::var(ROOT_ENV) {
            if !root.trim().is_empty() {
                settings.backup_root = PathBuf::from(root);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Paths derived from the backup root
    pub fn paths(&self) -> EnginePaths {
        EnginePaths::new(self.backup_root.clone())
    }

    /// Reject settings the engine cannot act on safely
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(EngineError::Config(format!(
                "Settings schema_version {} is newer than supported ({})",
                self.schema_version, SCHEMA_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            validate_identifier(&domain.identifier)?;
            if !seen.insert(domain.identifier.as_str()) {
                return Err(EngineError::Config(format!(
                    "Domain '{}' is registered twice",
                    domain.identifier
                )));
            }
        }

        if !(1..=22).contains(&self.compression_level) {
            return Err(EngineError::Config(format!(
                "compression_level must be between 1 and 22, got {}",
                self.compression_level
            )));
        }

        let encryption = &self.encryption;
        KeyDerivationParams::with_values(
            String::new(),
            encryption.memory_cost,
            encryption.time_cost,
            encryption.parallelism,
        )
        .check_bounds()
        .map_err(|e| EngineError::Config(format!("Invalid encryption costs: {}", e)))?;

        let threshold = self.retention.storage_threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(EngineError::Config(format!(
                "storage_threshold_percent must be in (0, 100], got {}",
                threshold
            )));
        }

        if let Some(cache) = &self.cache {
            if cache.command.is_empty() {
                return Err(EngineError::Config(
                    "cache.command must name the cache CLI".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Check a domain identifier is safe to use as a staging key
pub fn validate_identifier(identifier: &str) -> Result<(), EngineError> {
    let valid_chars = identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if identifier.is_empty() || !valid_chars || identifier.starts_with('.') {
        return Err(EngineError::Config(format!(
            "Invalid domain identifier '{}': use letters, digits, '-', '_' or '.'",
            identifier
        )));
    }

    if identifier == STAGED_MANIFEST || identifier == CACHE_DOMAIN {
        return Err(EngineError::Config(format!(
            "Domain identifier '{}' is reserved",
            identifier
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retention.daily, 7);
        assert_eq!(settings.retention.weekly, 4);
        assert_eq!(settings.retention.monthly, 3);
        assert_eq!(settings.retention.keep_count(Tier::Manual), None);
        assert!(!settings.encryption.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "backup_root": "/srv/backups",
                "domains": [{"identifier": "n8n", "source_path": "/srv/n8n", "required": true}],
                "retention": {"daily": 2}
            }"#,
        )
        .unwrap();

        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(settings.retention.daily, 2);
        assert_eq!(settings.retention.weekly, 4);
        assert_eq!(settings.domains.len(), 1);
        assert!(settings.domains[0].required);
        assert_eq!(settings.compression_level, 3);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"schema_version": 2}"#).unwrap();

        let err = Settings::load_or_create(&path).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("schema_version 2"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("n8n-data").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("../etc").is_err());
        assert!(validate_identifier(".hidden").is_err());
        assert!(validate_identifier(CACHE_DOMAIN).is_err());
        assert!(validate_identifier(STAGED_MANIFEST).is_err());
    }

    #[test]
    fn test_excessive_encryption_costs_rejected() {
        let mut settings = Settings::default();
        settings.encryption.memory_cost = 8 * 1024 * 1024;
        assert!(settings.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let mut settings = Settings::default();
        settings.domains.push(DomainSpec::new("n8n", "/a", false));
        settings.domains.push(DomainSpec::new("n8n", "/b", false));
        assert!(settings.validate().unwrap_err().is_config());
    }
}
