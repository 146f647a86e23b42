//! The default isolate: plain fork/exec children on the local host.

use crate::error::CoreError;
use crate::isolate::{Isolate, IsolateArgs, IsolateCategory, IsolateHandle};
use crate::repository::{Repository, RepositoryError};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Callback invoked around `fork()`.
pub type ForkHook = Box<dyn Fn()>;

/// Hooks for sandboxes that embed an interpreter and must fix up its state
/// across `fork()`: the parent acquires interpreter exclusivity before the
/// fork and releases it after, the child re-initializes interpreter state
/// before exec.
#[derive(Default)]
pub struct ForkHooks {
    /// Run in the calling process immediately before `fork()`.
    pub prepare: Vec<ForkHook>,

    /// Run in the parent after a successful `fork()`.
    pub parent: Vec<ForkHook>,

    /// Run in the child after `fork()`, before `execve()`.
    pub child: Vec<ForkHook>,
}

/// Spawns sandbox workers as directly forked child processes.
pub struct ProcessIsolate {
    app: String,
    hooks: ForkHooks,
}

impl ProcessIsolate {
    /// Create an isolate for the named app.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            hooks: ForkHooks::default(),
        }
    }

    /// Install interpreter fork handlers run around every spawn.
    pub fn set_fork_hooks(&mut self, hooks: ForkHooks) {
        self.hooks = hooks;
    }

    /// Fork and exec a worker, returning a handle that owns the child.
    ///
    /// The child's argument vector is `path` followed by alternating
    /// key/value pairs from `args`; its environment is `K=V` entries from
    /// `env`. Both maps are applied in iteration order. Exec failure makes
    /// the child exit non-zero after writing a diagnostic to stderr.
    pub fn spawn(
        &self,
        path: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<ProcessHandle, CoreError> {
        let argv = build_argv(path, args)?;
        let envp = build_envp(env)?;

        for hook in &self.hooks.prepare {
            hook();
        }

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                for hook in &self.hooks.child {
                    hook();
                }

                let errno = match unistd::execve(&argv[0], &argv, &envp) {
                    Ok(never) => match never {},
                    Err(errno) => errno,
                };

                // Still in the forked child: only async-signal-safe calls
                // from here on (no allocation, no locks), then _exit.
                let stderr = std::io::stderr();
                let _ = unistd::write(&stderr, b"unable to execute the worker: ");
                let _ = unistd::write(&stderr, errno.desc().as_bytes());
                let _ = unistd::write(&stderr, b"\n");
                unsafe { nix::libc::_exit(1) }
            }
            Ok(ForkResult::Parent { child }) => {
                for hook in &self.hooks.parent {
                    hook();
                }

                tracing::debug!(
                    app = %self.app,
                    pid = child.as_raw(),
                    path = %path.display(),
                    "spawned worker"
                );

                Ok(ProcessHandle {
                    pid: child,
                    reaped: false,
                })
            }
            Err(errno) => Err(CoreError::System(format!("fork() failed: {errno}"))),
        }
    }
}

impl Isolate for ProcessIsolate {
    fn spawn(
        &self,
        path: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<Box<dyn IsolateHandle>, CoreError> {
        Ok(Box::new(ProcessIsolate::spawn(self, path, args, env)?))
    }
}

/// Owns one forked worker process.
///
/// Dropping the handle terminates the worker. Only a non-blocking reap is
/// attempted; leftover zombies are the supervisor's responsibility.
pub struct ProcessHandle {
    pid: Pid,
    reaped: bool,
}

impl ProcessHandle {
    /// Pid of the owned child.
    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl IsolateHandle for ProcessHandle {
    fn terminate(&mut self) {
        if self.reaped {
            return;
        }

        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                if let Err(e) = signal::kill(self.pid, Signal::SIGTERM) {
                    tracing::warn!(pid = self.pid.as_raw(), error = %e, "unable to signal worker");
                }
            }
            Ok(_) | Err(_) => {
                self.reaped = true;
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Register the process isolate factory with a repository.
pub fn register(repository: &mut Repository) -> Result<(), RepositoryError> {
    repository.insert::<IsolateCategory>(
        "process",
        Box::new(|args: &IsolateArgs| {
            Ok(Box::new(ProcessIsolate::new(args.app.clone())) as Box<dyn Isolate>)
        }),
    )
}

// The argument vector is the executable path followed by alternating
// key/value pairs: exactly 1 + 2·|args| slots. execve() appends the
// terminating null itself.
fn build_argv(path: &Path, args: &BTreeMap<String, String>) -> Result<Vec<CString>, CoreError> {
    let mut argv = Vec::with_capacity(1 + 2 * args.len());
    argv.push(CString::new(path.as_os_str().as_bytes())?);

    for (key, value) in args {
        argv.push(CString::new(key.as_str())?);
        argv.push(CString::new(value.as_str())?);
    }

    Ok(argv)
}

fn build_envp(env: &BTreeMap<String, String>) -> Result<Vec<CString>, CoreError> {
    env.iter()
        .map(|(key, value)| Ok(CString::new(format!("{key}={value}"))?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_argv_layout() {
        let args = pairs(&[("--app", "example"), ("--uuid", "deadbeef")]);
        let argv = build_argv(&PathBuf::from("/usr/bin/worker"), &args).unwrap();

        assert_eq!(argv.len(), 1 + 2 * args.len());
        let strings: Vec<_> = argv.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(
            strings,
            ["/usr/bin/worker", "--app", "example", "--uuid", "deadbeef"]
        );
    }

    #[test]
    fn test_argv_rejects_interior_nul() {
        let args = pairs(&[("bad\0key", "value")]);
        let err = build_argv(&PathBuf::from("/usr/bin/worker"), &args).unwrap_err();
        assert!(matches!(err, CoreError::NulString(_)));
    }

    #[test]
    fn test_envp_layout() {
        let env = pairs(&[("A", "1"), ("B", "two")]);
        let envp = build_envp(&env).unwrap();

        let strings: Vec<_> = envp.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(strings, ["A=1", "B=two"]);
    }

    #[test]
    fn test_spawn_and_terminate() {
        let isolate = ProcessIsolate::new("example");
        let mut handle = isolate
            .spawn(
                &PathBuf::from("/bin/sleep"),
                &pairs(&[("30", "30")]),
                &BTreeMap::new(),
            )
            .unwrap();

        let pid = handle.pid();
        handle.terminate();

        let status = waitpid(pid, None).unwrap();
        assert_eq!(status, WaitStatus::Signaled(pid, Signal::SIGTERM, false));

        // Terminating again after the child is gone is a no-op.
        handle.terminate();
        handle.terminate();
    }

    #[test]
    fn test_exec_failure_exits_nonzero() {
        let isolate = ProcessIsolate::new("example");
        let handle = isolate
            .spawn(
                &PathBuf::from("/nonexistent/cradle-worker"),
                &BTreeMap::new(),
                &BTreeMap::new(),
            )
            .unwrap();

        let status = waitpid(handle.pid(), None).unwrap();
        assert_eq!(status, WaitStatus::Exited(handle.pid(), 1));
    }

    #[test]
    fn test_fork_hooks_run_in_parent() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let prepared = Arc::new(AtomicUsize::new(0));
        let parented = Arc::new(AtomicUsize::new(0));

        let mut isolate = ProcessIsolate::new("example");
        let hooks = ForkHooks {
            prepare: vec![{
                let prepared = Arc::clone(&prepared);
                Box::new(move || {
                    prepared.fetch_add(1, Ordering::SeqCst);
                })
            }],
            parent: vec![{
                let parented = Arc::clone(&parented);
                Box::new(move || {
                    parented.fetch_add(1, Ordering::SeqCst);
                })
            }],
            child: Vec::new(),
        };
        isolate.set_fork_hooks(hooks);

        let handle = isolate
            .spawn(
                &PathBuf::from("/nonexistent/cradle-worker"),
                &BTreeMap::new(),
                &BTreeMap::new(),
            )
            .unwrap();
        let _ = waitpid(handle.pid(), None);

        assert_eq!(prepared.load(Ordering::SeqCst), 1);
        assert_eq!(parented.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_process_isolate() {
        let mut repository = Repository::new();
        register(&mut repository).unwrap();

        let args = IsolateArgs {
            app: "example".into(),
            args: serde_json::Value::Null,
        };
        assert!(repository.get::<IsolateCategory>("process", &args).is_ok());
        assert!(repository.get::<IsolateCategory>("container", &args).is_err());
    }
}
