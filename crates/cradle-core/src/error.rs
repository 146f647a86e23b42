//! Error types for cradle-core.

use crate::repository::RepositoryError;
use thiserror::Error;

/// Result type alias for cradle-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while assembling or running a container.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An OS call failed.
    #[error("system error: {0}")]
    System(String),

    /// A string destined for an OS interface contained an interior nul byte.
    #[error("argument string contained an interior nul byte")]
    NulString(#[from] std::ffi::NulError),

    /// The app's manifest is missing or malformed.
    #[error("invalid manifest for app '{app}': {reason}")]
    InvalidManifest { app: String, reason: String },

    /// The requested profile is missing or malformed.
    #[error("invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Component repository failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<nix::errno::Errno> for CoreError {
    fn from(err: nix::errno::Errno) -> Self {
        CoreError::System(err.to_string())
    }
}
