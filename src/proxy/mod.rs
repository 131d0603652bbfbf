//! Conditional streaming reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware.rs (prefix match? classify streaming/buffered)
//!         miss → inner service (the host's next handler)
//!         hit  → forward to destination
//!             404  → decline, inner service runs
//!             else → streaming.rs relays the body back verbatim
//! ```
//!
//! # Design Decisions
//! - Stateless across requests; the destination descriptor is the only
//!   shared state and it is immutable
//! - 404 is control flow ("not handled"), never an error
//! - Classification comes from the Accept header alone

pub mod middleware;
pub mod streaming;

pub use middleware::{ConditionalProxy, ConditionalProxyLayer, ProxyDestination, ProxyError};
pub use streaming::{CopyMode, RelayBody};
