//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Launch dev server → Start HTTP host
//!
//! Shutdown (shutdown.rs):
//!     Signal received → trigger() → supervisor kills child,
//!     temp files delete, server drains → Exit
//! ```
//!
//! # Design Decisions
//! - One broadcast-based signal for the whole system; everything that must
//!   react to cancellation holds a clone
//! - Triggering is idempotent; the fired state stays queryable afterwards
//! - A dropped-but-never-fired signal is not a cancellation

pub mod shutdown;

pub use shutdown::Shutdown;
