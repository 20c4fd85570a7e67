//! Archive building and reading
//!
//! A staged snapshot becomes `<tier>_<label>.tar.zst[.enc]` plus a sibling
//! `<tier>_<label>.manifest`. The archive is produced in one streaming pass
//! (tar, then zstd, then the optional cipher) so no plaintext copy is ever
//! written when encryption is on. Both files are written under `.partial`
//! names and renamed only once both are complete.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::snapshot::{host_name, Snapshot};
use crate::config::settings::EncryptionSettings;
use crate::config::EnginePaths;
use crate::crypto::{DecryptingReader, EncryptingWriter, KeyDerivationParams, Passphrase};
use crate::error::{EngineError, EngineResult};
use crate::models::backup_set::{
    archive_file_name, is_encrypted_path, manifest_file_name, PARTIAL_SUFFIX,
};
use crate::models::{BackupSet, Tier, VerificationStatus};
use crate::storage::file_io::{first, read_key_values, render_key_values};

/// Final byte sink of the archive pipeline
enum ArchiveSink {
    Plain(BufWriter<File>),
    Sealed(EncryptingWriter<BufWriter<File>>),
}

impl ArchiveSink {
    fn finish(self) -> io::Result<File> {
        let writer = match self {
            ArchiveSink::Plain(writer) => writer,
            ArchiveSink::Sealed(writer) => writer.finish()?,
        };
        writer.into_inner().map_err(|e| e.into_error())
    }
}

impl Write for ArchiveSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveSink::Plain(w) => w.write(buf),
            ArchiveSink::Sealed(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveSink::Plain(w) => w.flush(),
            ArchiveSink::Sealed(w) => w.flush(),
        }
    }
}

/// Set name for a tier and an optional operator label
///
/// Without a label the completion timestamp (to the millisecond) is used.
pub fn set_name(tier: Tier, label: Option<&str>, now: DateTime<Utc>) -> EngineResult<String> {
    match label {
        Some(label) => {
            let valid = !label.is_empty()
                && !label.starts_with('.')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(EngineError::Config(format!(
                    "Invalid backup name '{}': use letters, digits, '-', '_' or '.'",
                    label
                )));
            }
            Ok(format!("{}_{}", tier, label))
        }
        None => Ok(format!(
            "{}_{}_{:03}",
            tier,
            now.format("%Y%m%d_%H%M%S"),
            now.timestamp_subsec_millis()
        )),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Writes archive + manifest pairs into tier directories
pub struct ArchiveBuilder<'a> {
    paths: &'a EnginePaths,
    compression_level: i32,
    encryption: &'a EncryptionSettings,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(
        paths: &'a EnginePaths,
        compression_level: i32,
        encryption: &'a EncryptionSettings,
    ) -> Self {
        Self {
            paths,
            compression_level,
            encryption,
        }
    }

    /// Pack a snapshot into a new set
    ///
    /// Encrypts when a passphrase is given. Makes no retention decisions. On
    /// any failure nothing of the new set is left in the tier directory.
    pub fn build(
        &self,
        snapshot: &Snapshot,
        tier: Tier,
        label: Option<&str>,
        passphrase: Option<&Passphrase>,
    ) -> EngineResult<BackupSet> {
        let name = set_name(tier, label, snapshot.created_at())?;
        let encrypted = passphrase.is_some();

        let tier_dir = self.paths.tier_dir(tier);
        fs::create_dir_all(&tier_dir).map_err(|e| {
            EngineError::Io(format!("Failed to create {}: {}", tier_dir.display(), e))
        })?;

        let archive_path = tier_dir.join(archive_file_name(&name, encrypted));
        let manifest_path = tier_dir.join(manifest_file_name(&name));

        let taken = [
            tier_dir.join(archive_file_name(&name, false)),
            tier_dir.join(archive_file_name(&name, true)),
            manifest_path.clone(),
        ];
        if taken.iter().any(|p| p.exists()) {
            return Err(EngineError::Duplicate {
                entity_type: "Backup",
                identifier: name,
            });
        }

        let artifacts = [
            partial_path(&archive_path),
            partial_path(&manifest_path),
            archive_path.clone(),
            manifest_path.clone(),
        ];

        match self.write_pair(snapshot, &name, tier, passphrase, &archive_path, &manifest_path) {
            Ok(set) => Ok(set),
            Err(e) => {
                for artifact in &artifacts {
                    let _ = fs::remove_file(artifact);
                }
                Err(e)
            }
        }
    }

    fn write_pair(
        &self,
        snapshot: &Snapshot,
        name: &str,
        tier: Tier,
        passphrase: Option<&Passphrase>,
        archive_path: &Path,
        manifest_path: &Path,
    ) -> EngineResult<BackupSet> {
        let archive_partial = partial_path(archive_path);
        let manifest_partial = partial_path(manifest_path);

        self.write_archive(snapshot, passphrase, &archive_partial)?;
        let created_at = snapshot.created_at();

        let encrypted = passphrase.is_some();
        let mut lines = vec![
            ("name", name.to_string()),
            ("tier", tier.to_string()),
            ("created_at", created_at.to_rfc3339()),
            ("hostname", host_name()),
            ("encrypted", encrypted.to_string()),
        ];
        lines.extend(snapshot.included().iter().map(|d| ("domain", d.clone())));
        lines.extend(snapshot.omitted().iter().map(|d| ("omitted", d.clone())));

        let mut manifest = File::create(&manifest_partial)
            .map_err(|e| EngineError::Io(format!("Failed to create manifest: {}", e)))?;
        manifest
            .write_all(render_key_values(lines).as_bytes())
            .and_then(|_| manifest.sync_all())
            .map_err(|e| EngineError::Io(format!("Failed to write manifest: {}", e)))?;

        // Manifest first: a lone manifest is ignored, a lone archive is not
        fs::rename(&manifest_partial, manifest_path)
            .map_err(|e| EngineError::Io(format!("Failed to finalize manifest: {}", e)))?;
        fs::rename(&archive_partial, archive_path)
            .map_err(|e| EngineError::Io(format!("Failed to finalize archive: {}", e)))?;

        let size_bytes = fs::metadata(archive_path)
            .map_err(|e| EngineError::Io(format!("Failed to stat archive: {}", e)))?
            .len();

        tracing::info!(
            set = name,
            %tier,
            size_bytes,
            encrypted,
            "Archive written"
        );

        Ok(BackupSet {
            name: name.to_string(),
            tier,
            created_at,
            source_domains: snapshot.included().to_vec(),
            size_bytes,
            encrypted,
            verification_status: VerificationStatus::Unknown,
            archive_path: archive_path.to_path_buf(),
            manifest_path: manifest_path.to_path_buf(),
        })
    }

    fn write_archive(
        &self,
        snapshot: &Snapshot,
        passphrase: Option<&Passphrase>,
        path: &Path,
    ) -> EngineResult<()> {
        let file = File::create(path)
            .map_err(|e| EngineError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        let buf_writer = BufWriter::new(file);

        let sink = match passphrase {
            Some(passphrase) => {
                let params = KeyDerivationParams::generate(self.encryption);
                ArchiveSink::Sealed(EncryptingWriter::new(buf_writer, passphrase, &params)?)
            }
            None => ArchiveSink::Plain(buf_writer),
        };

        let zstd_writer = zstd::Encoder::new(sink, self.compression_level)
            .map_err(|e| EngineError::Io(format!("zstd encoder: {}", e)))?;

        let mut tar_builder = tar::Builder::new(zstd_writer);
        tar_builder.follow_symlinks(false);

        let mut entries: Vec<_> = fs::read_dir(snapshot.path())
            .and_then(|dir| dir.collect::<io::Result<Vec<_>>>())
            .map_err(|e| EngineError::Io(format!("Failed to read staging directory: {}", e)))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name();
            let source = entry.path();
            let appended = if source.is_dir() {
                tar_builder.append_dir_all(&name, &source)
            } else {
                tar_builder.append_path_with_name(&source, &name)
            };
            appended.map_err(|e| {
                EngineError::Io(format!("Failed to archive {}: {}", source.display(), e))
            })?;
        }

        let zstd_writer = tar_builder
            .into_inner()
            .map_err(|e| EngineError::Io(format!("tar finish: {}", e)))?;
        let sink = zstd_writer
            .finish()
            .map_err(|e| EngineError::Io(format!("zstd finish: {}", e)))?;
        let file = sink
            .finish()
            .map_err(|e| EngineError::Io(format!("Failed to flush archive: {}", e)))?;
        file.sync_all()
            .map_err(|e| EngineError::Io(format!("Failed to sync archive: {}", e)))?;

        Ok(())
    }
}

/// Open an archive for reading as a tar stream
///
/// Encryption is detected from the `.enc` suffix; an encrypted archive
/// without a passphrase is a configuration error.
pub fn open_archive(
    path: &Path,
    passphrase: Option<&Passphrase>,
) -> EngineResult<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path)
        .map_err(|e| EngineError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let compressed: Box<dyn Read> = if is_encrypted_path(path) {
        let passphrase = passphrase.ok_or_else(|| {
            EngineError::Config(format!(
                "{} is encrypted and no passphrase is available",
                path.display()
            ))
        })?;
        Box::new(DecryptingReader::new(reader, passphrase)?)
    } else {
        Box::new(reader)
    };

    let decoder: Box<dyn Read> = Box::new(
        zstd::Decoder::new(compressed)
            .map_err(|e| EngineError::Integrity(format!("zstd decoder: {}", e)))?,
    );

    Ok(tar::Archive::new(decoder))
}

/// Contents of a sibling manifest
#[derive(Debug, Clone, Default)]
pub struct SetManifest {
    pub created_at: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub domains: Vec<String>,
}

impl SetManifest {
    /// Read a manifest, or `None` if the file doesn't exist
    pub fn load(path: &Path) -> EngineResult<Option<Self>> {
        let Some(map) = read_key_values(path)? else {
            return Ok(None);
        };

        Ok(Some(Self {
            created_at: first(&map, "created_at")
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            hostname: first(&map, "hostname").map(str::to_string),
            domains: map.get("domain").cloned().unwrap_or_default(),
        }))
    }
}
