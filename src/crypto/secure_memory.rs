//! Secure handling of archive passphrases
//!
//! Passphrases are wiped from memory on drop and never printed.

use std::fmt;
use std::path::Path;

use zeroize::Zeroizing;

use crate::config::settings::EncryptionSettings;
use crate::error::{EngineError, EngineResult};

/// A passphrase that zeros its contents on drop
pub struct Passphrase {
    inner: Zeroizing<String>,
}

impl Passphrase {
    /// Create a new Passphrase
    pub fn new(s: impl Into<String>) -> Self {
        Self {
            inner: Zeroizing::new(s.into()),
        }
    }

    /// Get the passphrase bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Resolve the configured passphrase without prompting
    ///
    /// Checks `passphrase_file` first, then the configured environment
    /// variable. Returns `None` when neither yields a non-empty value.
    pub fn from_settings(settings: &EncryptionSettings) -> EngineResult<Option<Self>> {
        if let Some(path) = &settings.passphrase_file {
            return Self::from_file(path).map(Some);
        }

        match std::env::var(&settings.passphrase_env) {
            Ok(value) if !value.is_empty() => Ok(Some(Self::new(value))),
            _ => Ok(None),
        }
    }

    /// Read the first line of a passphrase file
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read passphrase file {}: {}",
                path.display(),
                e
            ))
        })?);

        let line = contents.lines().next().unwrap_or("").trim_end();
        if line.is_empty() {
            return Err(EngineError::Config(format!(
                "Passphrase file {} is empty",
                path.display()
            )));
        }

        Ok(Self::new(line))
    }

    /// Ask on the terminal (only when the operator explicitly requests it)
    pub fn prompt(prompt: &str) -> EngineResult<Self> {
        let value = rpassword::prompt_password(prompt)
            .map_err(|e| EngineError::Config(format!("Failed to read passphrase: {}", e)))?;
        if value.is_empty() {
            return Err(EngineError::Config("Empty passphrase".into()));
        }
        Ok(Self::new(value))
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passphrase")
            .field("len", &self.inner.len())
            .finish()
    }
}
