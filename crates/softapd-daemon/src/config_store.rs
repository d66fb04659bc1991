//! Persistent AP configuration storage.
//!
//! The manager consumes this as an external collaborator: when it is
//! constructed without an explicit configuration, it falls back to the
//! stored profile. Reads are best-effort; a missing or corrupt file is
//! reported as "no configuration", never as a crash.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use softapd_core::ApConfiguration;

/// Errors from writing the configuration store.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Filesystem error.
    #[error("config store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("config store encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration profile storage.
pub trait ConfigStore: Send + Sync {
    /// Returns the stored AP configuration, if a usable one exists.
    fn ap_configuration(&self) -> Option<ApConfiguration>;

    /// Persists an AP configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the profile cannot be written.
    fn store_ap_configuration(&self, config: &ApConfiguration) -> Result<(), ConfigStoreError>;
}

/// JSON-file-backed [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Creates a store over the given file path. The file does not need
    /// to exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn ap_configuration(&self) -> Option<ApConfiguration> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %error, "failed to read stored AP configuration");
                }
                return None;
            },
        };
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "stored AP configuration is corrupt");
                None
            },
        }
    }

    fn store_ap_configuration(&self, config: &ApConfiguration) -> Result<(), ConfigStoreError> {
        let raw = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}
