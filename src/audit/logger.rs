//! Append-only event journal
//!
//! Each entry is written as a single JSON line and flushed immediately.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

use super::entry::JournalEntry;

/// Writes journal entries to a JSONL file
pub struct Journal {
    log_path: PathBuf,
}

impl Journal {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Append an entry
    pub fn record(&self, entry: &JournalEntry) -> EngineResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| EngineError::Io(format!("Failed to open journal: {}", e)))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| EngineError::Json(format!("Failed to serialize journal entry: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| EngineError::Io(format!("Failed to write journal entry: {}", e)))?;

        file.flush()
            .map_err(|e| EngineError::Io(format!("Failed to flush journal: {}", e)))?;

        Ok(())
    }

    /// Append an entry, logging instead of failing
    ///
    /// The journal is a record of operations, never a reason to fail one.
    pub fn record_best_effort(&self, entry: &JournalEntry) {
        if let Err(e) = self.record(entry) {
            tracing::warn!(journal = %self.log_path.display(), error = %e, "Journal write failed");
        }
    }

    /// Read all entries, oldest first
    ///
    /// Lines that fail to parse (e.g. torn by a crash) are skipped.
    pub fn read_all(&self) -> EngineResult<Vec<JournalEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| EngineError::Io(format!("Failed to open journal: {}", e)))?;

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                EngineError::Io(format!("Failed to read journal line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(line = line_num + 1, error = %e, "Skipping unreadable journal line");
                }
            }
        }

        Ok(entries)
    }

    /// Read the most recent N entries
    pub fn read_recent(&self, count: usize) -> EngineResult<Vec<JournalEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
