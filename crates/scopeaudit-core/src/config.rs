//! Configuration with environment variable support.
//!
//! [`AuditConfig`] selects the default creation policy and the data provider
//! used for new scopes. It can be built in code or loaded from `SCOPEAUDIT_*`
//! environment variables (optionally from a `.env` file).
//!
//! | variable                      | values                                   |
//! |-------------------------------|------------------------------------------|
//! | `SCOPEAUDIT_CREATION_POLICY`  | `insert_on_end` (default), `insert_on_start_replace_on_end`, `insert_on_start_insert_on_end`, `manual` |
//! | `SCOPEAUDIT_DATA_PROVIDER`    | `memory` (default), `file`               |
//! | `SCOPEAUDIT_FILE_DIRECTORY`   | directory for the `file` provider        |
//! | `SCOPEAUDIT_FILE_PREFIX`      | event file name prefix (default `audit_`) |
//!
//! # Example
//!
//! ```ignore
//! use scopeaudit_core::config::AuditConfig;
//!
//! let config = AuditConfig::from_dotenv()?;
//! let options = config.scope_options("Order:Create")?;
//! ```

use crate::error::{AuditError, Result};
use crate::policy::CreationPolicy;
use crate::provider::file::{FileDataProvider, FileDataProviderConfig};
use crate::provider::memory::InMemoryDataProvider;
use crate::provider::{BlockingProvider, DataProvider};
use crate::scope::AuditScopeOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Prefix of the environment variables read by [`AuditConfig::from_env`].
pub const ENV_PREFIX: &str = "SCOPEAUDIT_";

/// Data provider implementation to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// [`InMemoryDataProvider`].
    #[default]
    Memory,
    /// [`FileDataProvider`], requires a directory.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Creation policy of new scopes.
    #[serde(default)]
    pub creation_policy: CreationPolicy,
    /// Data provider implementation.
    #[serde(default)]
    pub data_provider: ProviderKind,
    /// Directory of the file provider.
    #[serde(default)]
    pub file_directory: Option<PathBuf>,
    /// File name prefix of the file provider.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "audit_".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            creation_policy: CreationPolicy::default(),
            data_provider: ProviderKind::default(),
            file_directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

impl AuditConfig {
    /// Create a configuration with default values (insert on end, memory provider).
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration from `SCOPEAUDIT_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`AuditError::Configuration`] when a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .map_err(|e| AuditError::Configuration(e.to_string()))
    }

    /// Load a `.env` file if present, then read the environment.
    ///
    /// # Errors
    ///
    /// See [`AuditConfig::from_env`].
    pub fn from_dotenv() -> Result<Self> {
        load_dotenv();
        Self::from_env()
    }

    /// Set the creation policy.
    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = policy;
        self
    }

    /// Use the in-memory provider.
    pub fn memory_provider(mut self) -> Self {
        self.data_provider = ProviderKind::Memory;
        self
    }

    /// Use the file provider writing to `directory`.
    pub fn file_provider(mut self, directory: impl Into<PathBuf>) -> Self {
        self.data_provider = ProviderKind::File;
        self.file_directory = Some(directory.into());
        self
    }

    /// Set the file name prefix of the file provider.
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Build the configured data provider.
    ///
    /// # Errors
    ///
    /// [`AuditError::Configuration`] when the file provider has no directory
    /// or its directory cannot be prepared.
    pub fn build_provider(&self) -> Result<Arc<dyn DataProvider>> {
        match self.data_provider {
            ProviderKind::Memory => Ok(Arc::new(InMemoryDataProvider::new())),
            ProviderKind::File => {
                let directory = self.file_directory.clone().ok_or_else(|| {
                    AuditError::Configuration(
                        "File data provider requires SCOPEAUDIT_FILE_DIRECTORY".to_string(),
                    )
                })?;
                let config = FileDataProviderConfig::new(directory).file_prefix(&self.file_prefix);
                let provider = FileDataProvider::new(config).map_err(|e| {
                    AuditError::Configuration(format!("Cannot open file data provider: {}", e))
                })?;
                Ok(Arc::new(BlockingProvider::new(provider)))
            }
        }
    }

    /// Scope options for a new event, using the configured policy and a
    /// freshly built provider.
    ///
    /// # Errors
    ///
    /// See [`AuditConfig::build_provider`].
    pub fn scope_options(&self, event_type: impl Into<String>) -> Result<AuditScopeOptions> {
        Ok(AuditScopeOptions::new(event_type)
            .policy(self.creation_policy)
            .data_provider(self.build_provider()?))
    }
}

/// Load environment variables from a `.env` file in the current directory or
/// its parents. Returns the path of the loaded file.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "Loaded .env file");
            Some(path)
        }
        Err(_) => None,
    }
}
