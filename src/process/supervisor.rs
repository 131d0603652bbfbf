//! Child process supervision.
//!
//! # Responsibilities
//! - Spawn one external process with captured stdout/stderr
//! - Forward output lines to a pluggable listener
//! - Bind the process's lifetime to the shutdown signal
//! - Resolve a single completion outcome (exit code or cancelled)
//! - Guarantee termination on disposal, idempotently
//!
//! # Design Decisions
//! - One supervisor instance supervises at most one process, ever; a second
//!   launch is an invalid-state error, not a restart
//! - The monitor task exclusively owns the `Child` and the completion
//!   sender, so the outcome resolves exactly once by construction
//! - Termination is best-effort: killing an already-dead process is logged
//!   at debug and swallowed
//! - Disposal is explicit and idempotent; `Drop` calls it as a last resort

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};

use crate::lifecycle::Shutdown;

/// Everything needed to start one process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run, resolved through `PATH`.
    pub command: String,
    /// Arguments, passed verbatim (no shell involved).
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: PathBuf,
    /// Environment overlay applied on top of the inherited environment.
    pub env: HashMap<String, String>,
}

/// Terminal outcome of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own with this code (`-1` if it was killed
    /// by a signal we did not send).
    Exited(i32),
    /// The shutdown signal fired before the process exited.
    Cancelled,
}

/// Errors from the launch surface.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("supervisor already disposed")]
    Disposed,
    #[error("a process has already been launched; create a new supervisor to spawn another")]
    AlreadyLaunched,
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

/// Receives stdout/stderr lines from the supervised process.
///
/// The defaults log through `tracing` (stdout at info, stderr at error);
/// specializations such as the Node launcher re-emit lines as events
/// instead.
pub trait OutputListener: Send + Sync + 'static {
    fn on_stdout(&self, line: &str) {
        tracing::info!("{}", line);
    }

    fn on_stderr(&self, line: &str) {
        tracing::error!("{}", line);
    }
}

/// Listener that just logs (the trait defaults).
pub struct LogOutput;

impl OutputListener for LogOutput {}

/// Single-resolution future for the process's terminal outcome.
///
/// `wait` returns `None` when the supervisor was disposed before an outcome
/// was observed; the outcome was abandoned, not resolved.
pub struct Completion {
    rx: oneshot::Receiver<ProcessOutcome>,
}

impl Completion {
    pub async fn wait(self) -> Option<ProcessOutcome> {
        self.rx.await.ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Launched,
    Disposed,
}

/// Owns one OS process end-to-end: start, stream capture, cancellation-bound
/// kill, completion signaling, disposal.
pub struct ProcessSupervisor {
    phase: Mutex<Phase>,
    terminate: Arc<TerminateHandle>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            terminate: Arc::new(TerminateHandle::new()),
        }
    }

    /// Spawn the process described by `spec` and supervise it until it
    /// exits, the shutdown signal fires, or the supervisor is disposed.
    ///
    /// Fails fast with an invalid-state error if this supervisor is disposed
    /// or has launched before.
    pub fn launch(
        &self,
        spec: LaunchSpec,
        listener: Arc<dyn OutputListener>,
        shutdown: Shutdown,
    ) -> Result<Completion, ProcessError> {
        {
            let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
            match *phase {
                Phase::Disposed => return Err(ProcessError::Disposed),
                Phase::Launched => return Err(ProcessError::AlreadyLaunched),
                Phase::Idle => *phase = Phase::Launched,
            }
        }

        tracing::info!(
            working_dir = %spec.working_dir.display(),
            "Spawning '{} {}'",
            spec.command,
            spec.args.join(" ")
        );

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination covers the whole tree.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        let pid = child.id().map(|id| id as i32);
        self.terminate.set_pid(pid);
        tracing::info!(pid = pid.unwrap_or(-1), "Spawned process");

        if let Some(stdout) = child.stdout.take() {
            let out = listener.clone();
            spawn_line_reader(stdout, move |line| out.on_stdout(line));
        }
        if let Some(stderr) = child.stderr.take() {
            let err = listener.clone();
            spawn_line_reader(stderr, move |line| err.on_stderr(line));
        }

        let (tx, rx) = oneshot::channel();
        let handle = self.terminate.clone();
        tokio::spawn(supervise(child, shutdown, handle, tx, spec.command));

        Ok(Completion { rx })
    }

    /// Release the supervised process: request termination if it is still
    /// running and abandon the completion. Safe to call any number of times,
    /// and concurrently with an in-flight cancellation.
    pub fn dispose(&self) {
        let was_launched = {
            let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
            if *phase == Phase::Disposed {
                return;
            }
            let was_launched = *phase == Phase::Launched;
            *phase = Phase::Disposed;
            was_launched
        };

        if was_launched {
            self.terminate.disposed.store(true, Ordering::SeqCst);
            self.terminate.request_termination();
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Idempotent kill switch shared between the supervisor and its monitor
/// task. The atomic flag is the guard around "already killed".
struct TerminateHandle {
    requested: AtomicBool,
    disposed: AtomicBool,
    notify: Notify,
    pid: Mutex<Option<i32>>,
}

impl TerminateHandle {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            notify: Notify::new(),
            pid: Mutex::new(None),
        }
    }

    fn set_pid(&self, pid: Option<i32>) {
        *self.pid.lock().unwrap_or_else(|p| p.into_inner()) = pid;
    }

    fn clear_pid(&self) {
        self.set_pid(None);
    }

    /// Request termination of the process tree. Only the first call acts;
    /// failures mean the process is already gone and are logged at debug.
    fn request_termination(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = *self.pid.lock().unwrap_or_else(|p| p.into_inner()) {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) => tracing::debug!(pid, "Sent SIGKILL to process group"),
                Err(errno) => tracing::debug!(
                    pid,
                    errno = %errno,
                    "Process group kill failed; process has likely exited"
                ),
            }
        }

        self.notify.notify_one();
    }
}

fn spawn_line_reader<R>(stream: R, handler: impl Fn(&str) + Send + 'static)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            handler(&line);
        }
    });
}

/// Monitor task: waits for the child to exit, killing it first if the
/// shutdown signal fires or disposal requests termination.
async fn supervise(
    mut child: Child,
    shutdown: Shutdown,
    handle: Arc<TerminateHandle>,
    done: oneshot::Sender<ProcessOutcome>,
    command: String,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop_requested(&shutdown, &handle) => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            handle.request_termination();
            // Portable fallback alongside the process-group kill.
            if let Err(error) = child.start_kill() {
                tracing::debug!(error = %error, "Kill request failed; process has likely exited");
            }
            child.wait().await
        }
    };

    handle.clear_pid();

    let code = match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(error) => {
            tracing::warn!(command = %command, error = %error, "Could not collect process exit status");
            -1
        }
    };

    tracing::info!(command = %command, exit_code = code, "Process exited");

    if handle.disposed.load(Ordering::SeqCst) {
        // Disposed mid-flight: abandon the completion rather than resolve it.
        return;
    }

    let outcome = if shutdown.is_triggered() {
        ProcessOutcome::Cancelled
    } else {
        ProcessOutcome::Exited(code)
    };
    let _ = done.send(outcome);
}

/// Resolves when either the external shutdown signal fires or disposal
/// requests termination.
async fn stop_requested(shutdown: &Shutdown, handle: &TerminateHandle) {
    tokio::select! {
        _ = shutdown.triggered() => {}
        _ = handle.notify.notified() => {}
    }
}
