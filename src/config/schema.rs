//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the dev-server bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Conditional proxy settings.
    pub proxy: ProxyConfig,

    /// Dev-server process settings.
    pub dev_server: DevServerConfig,

    /// Child-side parent-liveness watchdog settings.
    pub watchdog: WatchdogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Conditional proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path prefix to intercept; "/" intercepts every request.
    pub path_prefix: String,

    /// Destination scheme ("http").
    pub scheme: String,

    /// Destination host.
    pub host: String,

    /// Destination port.
    pub port: u16,

    /// Buffer size in bytes for buffered response copies.
    pub buffer_size: usize,

    /// Request timeout in seconds for buffered requests. Streaming requests
    /// are never timed out.
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/".to_string(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8090,
            buffer_size: 4096,
            request_timeout_secs: 100,
        }
    }
}

/// Dev-server process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevServerConfig {
    /// Launch a dev-server process at startup.
    pub enabled: bool,

    /// Script handed to the tool runtime.
    pub script: String,

    /// Pass-through arguments for the script.
    pub args: Vec<String>,

    /// Working directory for the child process.
    pub working_dir: String,

    /// Launch the runtime with its debugger-attach flag.
    pub inspect_brk: bool,

    /// Additional environment variables for the child process.
    pub environment: HashMap<String, String>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            script: String::new(),
            args: Vec::new(),
            working_dir: ".".to_string(),
            inspect_brk: false,
            environment: HashMap::new(),
        }
    }
}

/// Parent-liveness watchdog configuration, forwarded to the child.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Have the child absorb SIGINT so the parent always exits first.
    pub ignore_interrupt: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            ignore_interrupt: true,
        }
    }
}
