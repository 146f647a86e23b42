//! Sandbox contract.
//!
//! A sandbox is the language-specific plugin component that executes user
//! code for one invocation at a time. The slave runtime owns exactly one
//! sandbox instance for its whole lifetime and drives it through
//! [`Sandbox::invoke`].

use crate::repository::Category;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a sandbox during an invocation.
///
/// Neither variant is fatal to the slave: both are reported to the engine as
/// an `error` frame and the slave keeps serving.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The sandbox can no longer serve this request for reasons outside
    /// user code; reported to the engine as a server-side failure.
    #[error("unrecoverable error: {0}")]
    Unrecoverable(String),

    /// User code failed while handling the event; reported to the engine as
    /// an application failure.
    #[error("application error: {0}")]
    App(String),
}

impl From<io::Error> for SandboxError {
    fn from(e: io::Error) -> Self {
        // An I/O capability failure is the runtime's problem, not the app's.
        SandboxError::Unrecoverable(e.to_string())
    }
}

/// Byte-stream capability handed to a sandbox for the duration of one
/// invocation.
///
/// The slave lends this to [`Sandbox::invoke`]; implementations must not
/// retain it beyond the call.
#[async_trait(?Send)]
pub trait InvocationIo {
    /// Receive one input chunk, or `None` if nothing arrived in time.
    async fn read(&mut self, timeout: Duration) -> io::Result<Option<Bytes>>;

    /// Emit one output chunk.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// A language sandbox hosting user code for one app.
#[async_trait(?Send)]
pub trait Sandbox {
    /// Run user code for one request.
    ///
    /// The sandbox may read zero or more input chunks and write zero or
    /// more output chunks through `io` before returning. The slave closes
    /// the invocation after this returns, regardless of the outcome.
    async fn invoke(
        &mut self,
        event: &str,
        io: &mut dyn InvocationIo,
    ) -> Result<(), SandboxError>;
}

/// Construction arguments for sandbox factories.
#[derive(Debug, Clone)]
pub struct SandboxArgs {
    /// App name from the manifest.
    pub app: String,

    /// Sandbox-specific arguments from the manifest.
    pub args: serde_json::Value,

    /// The app's spool directory, used as the sandbox working directory.
    pub workdir: PathBuf,
}

/// Category of sandbox factories.
pub struct SandboxCategory;

impl Category for SandboxCategory {
    const NAME: &'static str = "sandbox";
    type Instance = Box<dyn Sandbox>;
    type Args = SandboxArgs;
}
