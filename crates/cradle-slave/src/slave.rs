//! Slave runtime: the worker-side event loop serving one app.
//!
//! A slave owns the bus to its engine, one sandbox instance, and three
//! timers:
//!
//! - a *heartbeat* sending `ping` every five seconds, first one immediately;
//! - a *disown watchdog* armed whenever a `ping` is unanswered - if no
//!   `pong` arrives in time the engine is considered gone and the loop
//!   exits;
//! - an *idle timer* re-armed after every invocation - an app nobody calls
//!   terminates itself.
//!
//! Everything runs on one cooperative task; each loop iteration handles a
//! single frame or timer expiry, so no event source can starve the others.

use crate::bus::{Bus, BusError};
use crate::config::SlaveConfig;
use async_trait::async_trait;
use bytes::Bytes;
use cradle_core::manifest::Manifest;
use cradle_core::profile::Profile;
use cradle_core::sandbox::{InvocationIo, Sandbox, SandboxArgs, SandboxCategory, SandboxError};
use cradle_core::Context;
use cradle_protocol::{RpcMessage, APP_ERROR, SERVER_ERROR};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep_until, Instant, Interval};
use uuid::Uuid;

/// Interval between liveness probes sent to the engine.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum time to wait for a heartbeat reply before declaring the engine
/// lost.
const DISOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the event loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A shutdown was requested (by the engine or the idle timer) and a
    /// `terminate` frame was sent.
    Terminated,

    /// The engine stopped answering heartbeats.
    Disowned,
}

/// Errors fatal to a slave.
#[derive(Debug, Error)]
pub enum SlaveError {
    /// The bus to the engine failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The slave could not be configured.
    #[error(transparent)]
    Core(#[from] cradle_core::CoreError),
}

enum Wakeup {
    Frame(Result<RpcMessage, BusError>),
    Heartbeat,
    Disowned,
    Idle,
}

/// A worker serving one app through one sandbox instance.
pub struct Slave {
    id: Uuid,
    app: String,
    bus: Bus,
    sandbox: Box<dyn Sandbox>,
    idle_timeout: Duration,
    idle_deadline: Instant,
    disown_deadline: Option<Instant>,
    heartbeat: Interval,
    // Control frames that arrived while a sandbox was reading its input;
    // served before the bus is polled again.
    deferred: VecDeque<RpcMessage>,
    exit: Option<ExitReason>,
}

impl Slave {
    /// Connect to the engine and configure the sandbox.
    ///
    /// Configuration failures are reported to the engine as
    /// `error(server_error)` followed by `terminate` before being returned
    /// to the caller.
    pub async fn connect(context: &Context, config: SlaveConfig) -> Result<Self, SlaveError> {
        let endpoint = context.config().endpoint(&config.app);
        tracing::info!(
            slave_id = %config.uuid,
            app = %config.app,
            endpoint = %endpoint.display(),
            "connecting to engine"
        );

        let mut bus = Bus::connect(&endpoint).await?;

        match Self::configure(context, &config) {
            Ok((sandbox, profile)) => Ok(Self {
                id: config.uuid,
                app: config.app,
                bus,
                sandbox,
                idle_timeout: profile.idle_timeout(),
                idle_deadline: Instant::now() + profile.idle_timeout(),
                disown_deadline: None,
                heartbeat: tokio::time::interval(HEARTBEAT_INTERVAL),
                deferred: VecDeque::new(),
                exit: None,
            }),
            Err(e) => {
                tracing::error!(
                    slave_id = %config.uuid,
                    app = %config.app,
                    error = %e,
                    "unable to configure the slave"
                );

                // Best effort: tell the engine why this slave will never
                // come up, then bail.
                let _ = bus.send(&RpcMessage::Error {
                    code: SERVER_ERROR,
                    message: e.to_string(),
                });
                let _ = bus.send(&RpcMessage::Terminate);
                let _ = bus.flush().await;

                Err(e.into())
            }
        }
    }

    fn configure(
        context: &Context,
        config: &SlaveConfig,
    ) -> Result<(Box<dyn Sandbox>, Profile), cradle_core::CoreError> {
        let manifest = Manifest::load(context.config(), &config.app)?;
        let profile = Profile::load(context.config(), &config.profile)?;

        let args = SandboxArgs {
            app: manifest.name.clone(),
            args: manifest.sandbox.args.clone(),
            workdir: context.config().spool_dir(&config.app),
        };
        let sandbox = context.get::<SandboxCategory>(&manifest.sandbox.kind, &args)?;

        Ok((sandbox, profile))
    }

    /// Drive the event loop until the slave terminates, is disowned, or the
    /// bus fails.
    pub async fn run(mut self) -> Result<ExitReason, SlaveError> {
        tracing::info!(slave_id = %self.id, app = %self.app, "slave running");

        let reason = loop {
            // Push out whatever the previous iteration enqueued before
            // waiting for new work.
            self.bus.flush().await?;

            if let Some(reason) = self.exit {
                break reason;
            }

            if let Some(message) = self.deferred.pop_front() {
                self.process(message).await?;
                continue;
            }

            let disown_at = self.disown_deadline;
            let wakeup = tokio::select! {
                biased;

                frame = self.bus.recv() => Wakeup::Frame(frame),

                _ = sleep_until(disown_at.unwrap_or_else(Instant::now)),
                    if disown_at.is_some() => Wakeup::Disowned,

                _ = sleep_until(self.idle_deadline) => Wakeup::Idle,

                _ = self.heartbeat.tick() => Wakeup::Heartbeat,
            };

            match wakeup {
                Wakeup::Frame(Ok(message)) => self.process(message).await?,
                Wakeup::Frame(Err(BusError::Protocol(e))) => {
                    // Malformed frames are confined to themselves.
                    tracing::warn!(slave_id = %self.id, error = %e, "dropping malformed message");
                }
                Wakeup::Frame(Err(e)) => return Err(e.into()),
                Wakeup::Heartbeat => {
                    self.bus.send(&RpcMessage::Ping)?;
                    self.disown_deadline = Some(Instant::now() + DISOWN_TIMEOUT);
                }
                Wakeup::Disowned => {
                    tracing::error!(
                        slave_id = %self.id,
                        app = %self.app,
                        "lost the controlling engine"
                    );
                    break ExitReason::Disowned;
                }
                Wakeup::Idle => {
                    tracing::info!(slave_id = %self.id, app = %self.app, "idle timeout expired");
                    self.terminate()?;
                }
            }
        };

        self.bus.flush().await?;
        tracing::info!(slave_id = %self.id, reason = ?reason, "slave stopped");
        Ok(reason)
    }

    async fn process(&mut self, message: RpcMessage) -> Result<(), SlaveError> {
        tracing::debug!(slave_id = %self.id, command = message.tag(), "received message");

        match message {
            RpcMessage::Pong => {
                self.disown_deadline = None;
            }
            RpcMessage::Invoke { event } => self.invoke(&event).await?,
            RpcMessage::Chunk(_) => {
                // Input left over from a previous, now-abandoned invocation.
                tracing::debug!(slave_id = %self.id, "dropping orphaned chunk");
            }
            RpcMessage::Terminate => self.terminate()?,
            other => {
                tracing::warn!(
                    slave_id = %self.id,
                    command = other.tag(),
                    "dropping unexpected message"
                );
            }
        }

        Ok(())
    }

    async fn invoke(&mut self, event: &str) -> Result<(), SlaveError> {
        tracing::debug!(slave_id = %self.id, event = %event, "invoking");

        let result = {
            let mut io = BusIo {
                bus: &mut self.bus,
                disown_deadline: &mut self.disown_deadline,
                deferred: &mut self.deferred,
            };
            self.sandbox.invoke(event, &mut io).await
        };

        match result {
            Ok(()) => {}
            Err(SandboxError::Unrecoverable(message)) => {
                tracing::error!(
                    slave_id = %self.id,
                    event = %event,
                    error = %message,
                    "invocation failed in the runtime"
                );
                self.bus.send(&RpcMessage::Error {
                    code: SERVER_ERROR,
                    message,
                })?;
            }
            Err(SandboxError::App(message)) => {
                tracing::debug!(
                    slave_id = %self.id,
                    event = %event,
                    error = %message,
                    "invocation failed in user code"
                );
                self.bus.send(&RpcMessage::Error {
                    code: APP_ERROR,
                    message,
                })?;
            }
        }

        // Exactly one choke closes the invocation, whatever happened above.
        self.bus.send(&RpcMessage::Choke)?;
        self.idle_deadline = Instant::now() + self.idle_timeout;

        Ok(())
    }

    // Idempotent: a second shutdown request is absorbed without emitting
    // another terminate frame.
    fn terminate(&mut self) -> Result<(), BusError> {
        if self.exit.is_none() {
            self.bus.send(&RpcMessage::Terminate)?;
            self.exit = Some(ExitReason::Terminated);
        }

        Ok(())
    }
}

// The io capability lent to the sandbox for one invocation: reads pull
// chunk frames off the bus, writes push chunk frames onto it. Control
// frames overtaken by an input read are not lost: a pong disarms the
// watchdog on the spot, everything else waits for the main loop.
struct BusIo<'a> {
    bus: &'a mut Bus,
    disown_deadline: &'a mut Option<Instant>,
    deferred: &'a mut VecDeque<RpcMessage>,
}

#[async_trait(?Send)]
impl InvocationIo for BusIo<'_> {
    async fn read(&mut self, timeout: Duration) -> io::Result<Option<Bytes>> {
        // Let output written so far reach the engine before waiting for
        // input it may be producing in response.
        self.bus.flush().await.map_err(into_io_error)?;

        loop {
            match self.bus.recv_timeout(timeout).await.map_err(into_io_error)? {
                Some(RpcMessage::Chunk(body)) => return Ok(Some(body)),
                Some(RpcMessage::Pong) => {
                    *self.disown_deadline = None;
                }
                Some(other) => {
                    tracing::debug!(
                        command = other.tag(),
                        "deferring message until the invocation completes"
                    );
                    self.deferred.push_back(other);
                }
                None => return Ok(None),
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.bus
            .send(&RpcMessage::Chunk(Bytes::copy_from_slice(data)))
            .map_err(into_io_error)?;
        self.bus.flush().await.map_err(into_io_error)
    }
}

fn into_io_error(e: BusError) -> io::Error {
    match e {
        BusError::Io(e) => e,
        other => io::Error::other(other),
    }
}
