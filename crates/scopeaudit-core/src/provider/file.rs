//! File-based data provider implementation

use super::{EventReference, SyncDataProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::event::AuditEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Configuration for the file data provider.
#[derive(Debug, Clone)]
pub struct FileDataProviderConfig {
    /// Directory holding one JSON file per event.
    pub directory: PathBuf,
    /// Prefix of each event file name.
    pub file_prefix: String,
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl FileDataProviderConfig {
    /// Create a new configuration for the given directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: "audit_".to_string(),
            create_if_missing: true,
        }
    }

    /// Set the file name prefix.
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Fail instead of creating a missing directory.
    pub fn require_existing(mut self) -> Self {
        self.create_if_missing = false;
        self
    }
}

/// File-based data provider.
///
/// Every insert writes a new pretty-printed JSON file named
/// `<prefix><uuid>.json`; the reference is that file name. A replace rewrites
/// the file in place and fails with [`ProviderError::NotFound`] when it does
/// not exist.
///
/// This provider is blocking. Plug it into a scope through
/// [`BlockingProvider`](super::BlockingProvider).
#[derive(Debug)]
pub struct FileDataProvider {
    config: FileDataProviderConfig,
}

impl FileDataProvider {
    /// Create a new file data provider, preparing its directory.
    pub fn new(config: FileDataProviderConfig) -> ProviderResult<Self> {
        if !config.directory.exists() {
            if config.create_if_missing {
                std::fs::create_dir_all(&config.directory)?;
            } else {
                return Err(ProviderError::Backend(format!(
                    "Audit directory does not exist: {}",
                    config.directory.display()
                )));
            }
        }
        Ok(Self { config })
    }

    /// Create a provider for the given directory with default configuration.
    pub fn open(directory: impl Into<PathBuf>) -> ProviderResult<Self> {
        Self::new(FileDataProviderConfig::new(directory))
    }

    /// Directory holding the event files.
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Read back the event stored under `reference`.
    pub fn read(&self, reference: &EventReference) -> ProviderResult<Option<AuditEvent>> {
        let path = self.path_for(reference)?;
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Read every parseable event in the directory. Unreadable files are skipped.
    pub fn read_all(&self) -> ProviderResult<Vec<AuditEvent>> {
        let mut events = Vec::new();
        for entry in std::fs::read_dir(&self.config.directory)? {
            let path = entry?.path();
            let is_event_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&self.config.file_prefix) && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_event_file {
                continue;
            }

            let parsed = File::open(&path)
                .map_err(ProviderError::from)
                .and_then(|f| {
                    serde_json::from_reader::<_, AuditEvent>(BufReader::new(f))
                        .map_err(ProviderError::from)
                });
            match parsed {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read audit event file");
                }
            }
        }
        Ok(events)
    }

    fn path_for(&self, reference: &EventReference) -> ProviderResult<PathBuf> {
        let name = reference.as_str();
        // References are bare file names; anything else could escape the directory.
        if reference.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ProviderError::NotFound(reference.clone()));
        }
        Ok(self.config.directory.join(name))
    }

    fn write_file(&self, path: &Path, event: &AuditEvent, create_new: bool) -> ProviderResult<()> {
        let json = serde_json::to_vec_pretty(event)?;
        let mut file = if create_new {
            OpenOptions::new().write(true).create_new(true).open(path)?
        } else {
            OpenOptions::new().write(true).truncate(true).open(path)?
        };
        file.write_all(&json)?;
        file.flush()?;
        Ok(())
    }
}

impl SyncDataProvider for FileDataProvider {
    fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        let name = format!("{}{}.json", self.config.file_prefix, Uuid::new_v4());
        let path = self.config.directory.join(&name);
        self.write_file(&path, event, true)?;

        tracing::debug!(path = %path.display(), "Audit event file created");
        Ok(EventReference::new(name))
    }

    fn replace_event(&self, reference: &EventReference, event: &AuditEvent) -> ProviderResult<()> {
        let path = self.path_for(reference)?;
        if !path.exists() {
            return Err(ProviderError::NotFound(reference.clone()));
        }
        self.write_file(&path, event, false)
    }
}
