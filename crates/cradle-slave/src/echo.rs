//! Built-in echo sandbox.
//!
//! A minimal sandbox used as a smoke target for freshly provisioned nodes:
//! `echo` streams its input back, `noop` returns immediately.

use async_trait::async_trait;
use cradle_core::repository::{Repository, RepositoryError};
use cradle_core::sandbox::{InvocationIo, Sandbox, SandboxArgs, SandboxCategory, SandboxError};
use std::time::Duration;

/// How long `echo` waits for a further input chunk before concluding the
/// stream is complete.
const INPUT_TIMEOUT: Duration = Duration::from_millis(100);

/// Sandbox answering `echo` and `noop` events.
pub struct EchoSandbox;

#[async_trait(?Send)]
impl Sandbox for EchoSandbox {
    async fn invoke(
        &mut self,
        event: &str,
        io: &mut dyn InvocationIo,
    ) -> Result<(), SandboxError> {
        match event {
            "echo" => {
                while let Some(chunk) = io.read(INPUT_TIMEOUT).await? {
                    io.write(&chunk).await?;
                }
                Ok(())
            }
            "noop" => Ok(()),
            other => Err(SandboxError::App(format!("unknown event '{other}'"))),
        }
    }
}

/// Register the echo sandbox factory with a repository.
pub fn register(repository: &mut Repository) -> Result<(), RepositoryError> {
    repository.insert::<SandboxCategory>(
        "echo",
        Box::new(|_args: &SandboxArgs| Ok(Box::new(EchoSandbox) as Box<dyn Sandbox>)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::io;

    struct ScriptedIo {
        input: VecDeque<Bytes>,
        output: Vec<Bytes>,
    }

    #[async_trait(?Send)]
    impl InvocationIo for ScriptedIo {
        async fn read(&mut self, _timeout: Duration) -> io::Result<Option<Bytes>> {
            Ok(self.input.pop_front())
        }

        async fn write(&mut self, data: &[u8]) -> io::Result<()> {
            self.output.push(Bytes::copy_from_slice(data));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_echo_streams_input_back() {
        let mut io = ScriptedIo {
            input: VecDeque::from([Bytes::from_static(b"one"), Bytes::from_static(b"two")]),
            output: Vec::new(),
        };

        EchoSandbox.invoke("echo", &mut io).await.unwrap();
        assert_eq!(
            io.output,
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
    }

    #[tokio::test]
    async fn test_noop_reads_nothing() {
        let mut io = ScriptedIo {
            input: VecDeque::from([Bytes::from_static(b"ignored")]),
            output: Vec::new(),
        };

        EchoSandbox.invoke("noop", &mut io).await.unwrap();
        assert!(io.output.is_empty());
        assert_eq!(io.input.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_event_is_an_app_error() {
        let mut io = ScriptedIo {
            input: VecDeque::new(),
            output: Vec::new(),
        };

        let err = EchoSandbox.invoke("transmogrify", &mut io).await.unwrap_err();
        assert!(matches!(err, SandboxError::App(_)));
    }
}
