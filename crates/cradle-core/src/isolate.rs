//! Isolate contract.
//!
//! An isolate is the strategy by which an engine hosts sandboxes: it turns a
//! binary path plus argument and environment maps into a running worker and
//! hands back a handle that keeps the worker alive.

use crate::error::CoreError;
use crate::repository::Category;
use std::collections::BTreeMap;
use std::path::Path;

/// Owns one running worker. Dropping the handle releases the worker.
pub trait IsolateHandle {
    /// Ask the worker to shut down. Idempotent; best-effort.
    fn terminate(&mut self);
}

/// A sandbox-hosting strategy.
pub trait Isolate {
    /// Launch `path` with the given argument and environment maps, both
    /// applied in iteration order.
    fn spawn(
        &self,
        path: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<Box<dyn IsolateHandle>, CoreError>;
}

/// Construction arguments for isolate factories.
#[derive(Debug, Clone)]
pub struct IsolateArgs {
    /// App name the isolate hosts workers for.
    pub app: String,

    /// Isolate-specific arguments from the profile.
    pub args: serde_json::Value,
}

/// Category of isolate factories.
pub struct IsolateCategory;

impl Category for IsolateCategory {
    const NAME: &'static str = "isolate";
    type Instance = Box<dyn Isolate>;
    type Args = IsolateArgs;
}
