//! Per-app static metadata.

use crate::config::Config;
use crate::error::CoreError;
use serde::Deserialize;
use std::fs;

/// Describes how to build an app's sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxDescriptor {
    /// Registered sandbox type name, resolved through the repository.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque arguments handed to the sandbox factory.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Static metadata shipped inside an app's spool directory.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// App name.
    pub name: String,

    /// Sandbox selection and configuration.
    pub sandbox: SandboxDescriptor,
}

impl Manifest {
    /// File name of the manifest inside the app's spool directory.
    pub const FILE_NAME: &'static str = "manifest.json";

    /// Load the manifest of the named app.
    pub fn load(config: &Config, app: &str) -> Result<Self, CoreError> {
        let path = config.spool_dir(app).join(Self::FILE_NAME);

        let data = fs::read(&path).map_err(|e| CoreError::InvalidManifest {
            app: app.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;

        serde_json::from_slice(&data).map_err(|e| CoreError::InvalidManifest {
            app: app.to_string(),
            reason: e.to_string(),
        })
    }
}
