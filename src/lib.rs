//! Dev-server bridge library.
//!
//! Lets an axum-hosted web server delegate matching requests to a locally
//! spawned dev-server process, supervising that process end-to-end and
//! tearing it down on shutdown.

pub mod config;
pub mod fs;
pub mod lifecycle;
pub mod process;
pub mod proxy;

pub use config::BridgeConfig;
pub use lifecycle::Shutdown;
pub use process::{NodeDevServer, ProcessSupervisor};
pub use proxy::{ConditionalProxyLayer, ProxyDestination};
