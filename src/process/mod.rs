//! Process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! node.rs (build command line + NODE_PATH)
//!     → supervisor.rs (spawn, capture output, bind to shutdown signal)
//!     → Completion resolves: exit code or cancelled
//!
//! Inside the child:
//!     watchdog.rs polls the parent pid → self-terminate when it is gone
//! ```
//!
//! # Design Decisions
//! - One supervisor per process, one-shot; restart means a new supervisor
//! - Termination kills the process group, not just the immediate child
//! - The watchdog exists for the one path the parent cannot cover: the
//!   parent being killed without running its cleanup

pub mod node;
pub mod supervisor;
pub mod watchdog;

pub use node::{NodeDevServer, NodeScript, OutputLine};
pub use supervisor::{
    Completion, LaunchSpec, LogOutput, OutputListener, ProcessError, ProcessOutcome,
    ProcessSupervisor,
};
pub use watchdog::{ParentWatchdog, WatchdogError, WatchdogOptions};
