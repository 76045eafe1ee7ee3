//! Error types for allow-map stores, the extension manager and the runner.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an allow-map backing store.
///
/// Corrupt content is never reported through this type; it is logged and
/// treated as empty. Only stores that exist but cannot be accessed fail.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file exists but could not be read or written
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path of the backing file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// The allow-map or settings document could not be serialized
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A policy key primitive failed
    #[error("policy key error: {0}")]
    Key(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by an extension manager collaborator.
///
/// The enforcement engine folds these into per-item outcomes instead of
/// propagating them.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The tool could not be started
    #[error("failed to run extension manager: {0}")]
    Spawn(#[from] std::io::Error),
    /// The tool ran but reported failure
    #[error("extension manager exited with {status}: {stderr}")]
    Failed {
        /// Exit status as reported by the OS
        status: String,
        /// Captured standard error
        stderr: String,
    },
}

/// Errors that abort a policy run.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Loading or persisting the allow-map failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
