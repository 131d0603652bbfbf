//! Dev-server bridge host.
//!
//! A development web host built with Tokio and Axum that spawns a dev-server
//! tool as a supervised child process and transparently delegates matching
//! requests to it.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                   DEV BRIDGE                     │
//!                    │                                                  │
//!   Client Request   │  ┌──────────────┐ hit  ┌───────────────────┐    │
//!   ─────────────────┼─▶│ conditional  │─────▶│  hyper client     │────┼──▶ dev server
//!                    │  │ proxy layer  │      │  (forward + relay)│    │    (child process)
//!                    │  └──────┬───────┘      └───────────────────┘    │        ▲
//!                    │         │ miss / 404                            │        │
//!                    │         ▼                                       │   supervised by
//!                    │  ┌──────────────┐                               │  ┌─────────────┐
//!                    │  │   fallback   │                               │  │  process    │
//!                    │  │   handler    │                               │  │  supervisor │
//!                    │  └──────────────┘                               │  └─────────────┘
//!                    │                                                  │
//!                    │  Cross-cutting: config · lifecycle · tracing     │
//!                    └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod fs;
pub mod lifecycle;
pub mod process;
pub mod proxy;

use std::collections::HashMap;
use std::path::PathBuf;

use axum::http::{StatusCode, Uri};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BridgeConfig;
use crate::fs::ScopedTempFile;
use crate::lifecycle::Shutdown;
use crate::process::node::{self, NodeScript};
use crate::process::{NodeDevServer, OutputLine, ProcessOutcome};
use crate::proxy::{ConditionalProxyLayer, ProxyDestination};

#[derive(Parser)]
#[command(name = "dev-bridge")]
#[command(about = "Web host that delegates matched requests to a supervised dev-server process", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dev-server script to launch (overrides the config file).
    #[arg(long)]
    script: Option<PathBuf>,

    /// Listen address (overrides the config file).
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dev_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("dev-bridge v0.1.0 starting");

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => config::loader::load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(script) = cli.script {
        config.dev_server.enabled = true;
        config.dev_server.script = script.display().to_string();
    }
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        path_prefix = %config.proxy.path_prefix,
        destination = %format!("{}://{}:{}", config.proxy.scheme, config.proxy.host, config.proxy.port),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();

    // Launch the dev server before any proxying happens.
    let mut dev_server = None;
    let mut _options_file = None;
    if config.dev_server.enabled {
        let (server, completion, options_file) = launch_dev_server(&config, &shutdown)?;
        dev_server = Some((server, completion));
        _options_file = Some(options_file);
    }

    let destination = ProxyDestination::from(&config.proxy);
    let proxy = ConditionalProxyLayer::new(&config.proxy.path_prefix, destination)?;

    let app = Router::new()
        .fallback(not_handled)
        .layer(proxy)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The signal has fired; wait for the child to go away before leaving.
    if let Some((server, completion)) = dev_server {
        shutdown.trigger();
        match completion.wait().await {
            Some(ProcessOutcome::Cancelled) => tracing::info!("Dev server terminated"),
            Some(ProcessOutcome::Exited(code)) => {
                tracing::info!(exit_code = code, "Dev server had already exited")
            }
            None => {}
        }
        drop(server);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Start the configured dev-server script under supervision, handing it the
/// serialized options and our pid through the environment.
fn launch_dev_server(
    config: &BridgeConfig,
    shutdown: &Shutdown,
) -> Result<(NodeDevServer, process::Completion, ScopedTempFile), Box<dyn std::error::Error>> {
    let payload = serde_json::to_string_pretty(&config.dev_server)?;
    let options_file = ScopedTempFile::new(&payload, shutdown)?;

    let mut env: HashMap<String, String> = config.dev_server.environment.clone();
    env.insert(
        node::OPTIONS_FILE_VAR.to_string(),
        options_file.path().display().to_string(),
    );
    env.insert(
        node::PARENT_PID_VAR.to_string(),
        std::process::id().to_string(),
    );

    let script = NodeScript {
        script: PathBuf::from(&config.dev_server.script),
        args: config.dev_server.args.clone(),
        working_dir: PathBuf::from(&config.dev_server.working_dir),
        env,
        inspect_brk: config.dev_server.inspect_brk,
    };

    let (server, completion, mut events) = NodeDevServer::launch(script, shutdown.clone())?;

    // Surface child output through our own logs.
    tokio::spawn(async move {
        while let Some(line) = events.recv().await {
            match line {
                OutputLine::Stdout(line) => tracing::info!(stream = "stdout", "{}", line),
                OutputLine::Stderr(line) => tracing::warn!(stream = "stderr", "{}", line),
            }
        }
    });

    Ok((server, completion, options_file))
}

/// Fallback for requests the dev server does not handle.
async fn not_handled(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No handler for {uri}"))
}

/// Wait for shutdown signal (Ctrl+C) and fan it out.
async fn shutdown_signal(shutdown: Shutdown) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}
