//! Runtime configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::PathBuf;

/// Filesystem layout consumed by a cradle runtime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for plugin shared objects.
    pub plugin_path: PathBuf,

    /// Root of per-app spool directories (unpacked app bundles).
    pub spool_path: PathBuf,

    /// Directory holding per-app bus endpoints.
    pub ipc_path: PathBuf,

    /// Directory holding runtime profiles.
    pub profile_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_path: PathBuf::from("/usr/lib/cradle"),
            spool_path: PathBuf::from("/var/spool/cradle"),
            ipc_path: PathBuf::from("/var/run/cradle"),
            profile_path: PathBuf::from("/etc/cradle/profiles"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CRADLE_PLUGIN_PATH` | `/usr/lib/cradle` |
    /// | `CRADLE_SPOOL_PATH` | `/var/spool/cradle` |
    /// | `CRADLE_IPC_PATH` | `/var/run/cradle` |
    /// | `CRADLE_PROFILE_PATH` | `/etc/cradle/profiles` |
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            plugin_path: std::env::var("CRADLE_PLUGIN_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.plugin_path),
            spool_path: std::env::var("CRADLE_SPOOL_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.spool_path),
            ipc_path: std::env::var("CRADLE_IPC_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.ipc_path),
            profile_path: std::env::var("CRADLE_PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.profile_path),
        }
    }

    /// Bus endpoint of the named app: a Unix-domain socket the engine binds
    /// and every slave of that app connects to.
    pub fn endpoint(&self, app: &str) -> PathBuf {
        self.ipc_path.join(app)
    }

    /// Spool directory of the named app, passed to its sandbox as the
    /// working directory.
    pub fn spool_dir(&self, app: &str) -> PathBuf {
        self.spool_path.join(app)
    }

    /// Log a warning for every configured directory that does not exist.
    ///
    /// Missing directories surface as connect or load failures later; this
    /// just makes the startup log explicit about them.
    pub fn validate_warn(&self) {
        if !self.plugin_path.exists() {
            tracing::warn!("plugin directory not found: {:?}", self.plugin_path);
        }
        if !self.spool_path.exists() {
            tracing::warn!("spool directory not found: {:?}", self.spool_path);
        }
        if !self.ipc_path.exists() {
            tracing::warn!("ipc directory not found: {:?}", self.ipc_path);
        }
        if !self.profile_path.exists() {
            tracing::warn!("profile directory not found: {:?}", self.profile_path);
        }
    }
}
