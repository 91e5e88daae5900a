//! Parley daemon entry point.
//!
//! Wires the CLI-backed agent runtime, the session registry, and the
//! HTTP/WebSocket server together, then waits for a termination signal.
//! On shutdown every live session is interrupted so no in-flight agent
//! call is silently abandoned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use parley_core::meta::FileMetadataStore;
use parley_core::runtime::CliRuntime;
use parley_core::{RegistryConfig, SessionRegistry};
use parley_http::SharedState;

#[derive(Parser, Debug)]
#[command(name = "parley-daemon", about = "Web chat daemon for agent conversations")]
struct Args {
    /// Host to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, default_value_t = 8130)]
    port: u16,

    /// Root directory for per-user session homes.
    #[arg(long)]
    sessions_root: PathBuf,

    /// Agent CLI binary to invoke for prompts.
    #[arg(long, default_value = "claude")]
    agent_binary: String,

    /// Directory of static UI assets to serve.
    #[arg(long)]
    static_dir: Option<String>,

    /// Minutes a session may stay idle before eviction.
    #[arg(long, default_value_t = 30)]
    idle_minutes: u64,

    /// Minutes between eviction sweeps.
    #[arg(long, default_value_t = 5)]
    sweep_minutes: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = RegistryConfig::new(&args.sessions_root)
        .idle_threshold(Duration::from_secs(args.idle_minutes * 60))
        .sweep_interval(Duration::from_secs(args.sweep_minutes * 60));
    let runtime = Arc::new(CliRuntime::new(&args.agent_binary));
    let registry = Arc::new(SessionRegistry::new(config, runtime));
    let metadata = Arc::new(FileMetadataStore::new(args.sessions_root.join(".metadata")));

    let sweeper = Arc::clone(&registry).spawn_sweeper();

    let state = Arc::new(SharedState::new(Arc::clone(&registry), metadata));
    let mut server = match parley_http::start(state, &args.host, args.port, args.static_dir).await {
        Ok(handle) => handle,
        Err(err) => {
            log::error!("failed to start HTTP server: {}", err);
            std::process::exit(1);
        }
    };

    wait_for_shutdown_signal().await;
    log::info!("termination signal received, shutting down");

    sweeper.abort();
    registry.shutdown();
    server.stop().await;
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {}", err);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
