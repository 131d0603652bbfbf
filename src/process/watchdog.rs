//! Parent-liveness watchdog.
//!
//! # Responsibilities
//! - Poll whether the parent process id still exists
//! - Self-terminate once the parent is gone
//! - Optionally absorb SIGINT so the parent always exits first
//!
//! Runs inside the spawned child. The supervising parent kills the child on
//! every graceful exit path; this watchdog covers the ungraceful ones
//! (`kill -9` on the parent) where no parent-side cleanup can run. Polling
//! the parent pid is the only documented cross-platform strategy for
//! detecting an orphaned child.
//!
//! # Design Decisions
//! - The existence probe is signal 0: it tests the pid without touching the
//!   target process
//! - A permissions failure on the probe is a hard error, not "parent gone";
//!   polling on under EPERM would silently never fire
//! - With `ignore_interrupt` set, SIGINT does not request local termination;
//!   the polling path is the only shutdown path, which guarantees the child
//!   outlives the parent under Ctrl+C

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("permission denied probing parent process {pid}")]
    PermissionDenied { pid: i32 },
    #[error("probing parent process {pid} failed: {message}")]
    Probe { pid: i32, message: String },
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] std::io::Error),
    #[error("parent liveness probing is not supported on this platform")]
    Unsupported,
}

/// Result of one liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentProbe {
    Alive,
    Gone,
}

/// Probe whether `pid` currently refers to a running process, without
/// signaling it.
#[cfg(unix)]
pub fn probe_process(pid: i32) -> Result<ParentProbe, WatchdogError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => Ok(ParentProbe::Alive),
        Err(Errno::ESRCH) => Ok(ParentProbe::Gone),
        Err(Errno::EPERM) => Err(WatchdogError::PermissionDenied { pid }),
        Err(errno) => Err(WatchdogError::Probe {
            pid,
            message: errno.to_string(),
        }),
    }
}

#[cfg(not(unix))]
pub fn probe_process(_pid: i32) -> Result<ParentProbe, WatchdogError> {
    Err(WatchdogError::Unsupported)
}

#[derive(Debug, Clone)]
pub struct WatchdogOptions {
    /// Pid of the supervising parent process.
    pub parent_pid: i32,
    /// How often to probe.
    pub poll_interval: Duration,
    /// Absorb SIGINT instead of terminating, deferring shutdown to the
    /// polling path.
    pub ignore_interrupt: bool,
}

/// Watches the parent process and terminates this process when it is gone.
pub struct ParentWatchdog {
    options: WatchdogOptions,
}

impl ParentWatchdog {
    pub fn new(options: WatchdogOptions) -> Self {
        Self { options }
    }

    /// Poll until the parent no longer exists.
    ///
    /// Returns `Ok(())` the first tick the parent is gone; probe failures
    /// surface as errors and stop the polling.
    pub async fn wait_for_parent_exit(&self) -> Result<(), WatchdogError> {
        let mut ticks = interval(self.options.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            match probe_process(self.options.parent_pid)? {
                ParentProbe::Alive => {}
                ParentProbe::Gone => {
                    tracing::info!(
                        parent_pid = self.options.parent_pid,
                        "Parent process has exited"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Run the watchdog to completion: exits this process once the parent is
    /// gone. Only probe failures return.
    pub async fn run(self) -> Result<Infallible, WatchdogError> {
        if self.options.ignore_interrupt {
            suppress_interrupt()?;
        }

        self.wait_for_parent_exit().await?;
        std::process::exit(0);
    }
}

/// Install a SIGINT listener whose only action is to log that we are waiting
/// for the parent. Installing the handler replaces the default terminate
/// disposition for as long as the task lives.
#[cfg(unix)]
fn suppress_interrupt() -> Result<(), WatchdogError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            tracing::info!("Received interrupt; waiting for the parent process to exit first");
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn suppress_interrupt() -> Result<(), WatchdogError> {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            tracing::info!("Received interrupt; waiting for the parent process to exit first");
        }
    });
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        let pid = std::process::id() as i32;
        assert_eq!(probe_process(pid).unwrap(), ParentProbe::Alive);
    }

    #[test]
    fn nonexistent_pid_is_gone() {
        // Far above any kernel pid_max.
        assert_eq!(probe_process(i32::MAX).unwrap(), ParentProbe::Gone);
    }
}
