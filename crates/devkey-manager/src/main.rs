//! Device key manager service entry point.
//!
//! Loads configuration, starts the key event dispatcher and serves the IPC
//! socket until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! devkey-manager [OPTIONS]
//!
//! Options:
//!   --config    <PATH>   Config file [default: platform config dir]
//!   --bind      <ADDR>   IPC listen address, overrides the config file
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML file or defaults
//!  └─ KeyEventDispatcher::spawn -- registry + worker task
//!  └─ IpcServer::run           -- one task per handler / platform connection
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use devkey_manager::application::dispatch_keys::KeyEventDispatcher;
use devkey_manager::infrastructure::ipc::IpcServer;
use devkey_manager::infrastructure::storage::config::{load_config, load_config_from, AppConfig};

/// Extra time on top of one delivery timeout before shutdown gives up waiting.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Routes hardware key events to registered handler processes.
#[derive(Debug, Parser)]
#[command(name = "devkey-manager", version)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// When omitted the platform config directory is used; a missing file
    /// means defaults.
    #[arg(long, env = "DEVKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the IPC server, e.g. `127.0.0.1:24900`.
    #[arg(long, env = "DEVKEY_BIND")]
    bind: Option<SocketAddr>,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[arg(long, env = "DEVKEY_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // An explicit --config must be readable; the default location may be absent or broken.
    let (config, config_warning) = match &cli.config {
        Some(path) => (
            load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None,
        ),
        None => match load_config() {
            Ok(cfg) => (cfg, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.service.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    if let Some(e) = config_warning {
        warn!("using default configuration: {e}");
    }

    info!("device key manager starting");

    let bind = match cli.bind {
        Some(addr) => addr,
        None => config.bind_addr()?,
    };

    let dispatcher_config = config.dispatcher_config();
    let drain_limit = dispatcher_config.delivery_timeout + SHUTDOWN_GRACE;
    let dispatcher = KeyEventDispatcher::spawn(dispatcher_config);
    let server = IpcServer::bind(bind, dispatcher.clone())
        .await
        .context("failed to start IPC server")?;
    info!("listening for key handlers on {}", server.local_addr()?);

    tokio::select! {
        _ = server.run() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutdown signal received");
        }
    }

    // Dropping `server.run()` above closed every connection, so no new
    // deliveries arrive; the ones in flight end within one delivery timeout.
    if tokio::time::timeout(drain_limit, dispatcher.settle()).await.is_err() {
        warn!("gave up waiting for in-flight key deliveries after {drain_limit:?}");
    }
    info!("device key manager stopped");
    Ok(())
}
