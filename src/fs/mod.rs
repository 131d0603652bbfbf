//! Filesystem collaborators.
//!
//! # Responsibilities
//! - Temp-file hand-off of configuration payloads to the child process

pub mod temp;

pub use temp::ScopedTempFile;
