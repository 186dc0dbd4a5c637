//! # Simulation I/O Bridge Binary
//!
//! Loads the unit configuration, starts the auto-start units and serves
//! simulation peers until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Default config (/etc/simio/bridge.toml)
//! simio_bridge
//!
//! # Explicit config, different endpoint, verbose
//! simio_bridge --config config/bridge.toml --listen 127.0.0.1:50001 -v
//!
//! # JSON logs
//! simio_bridge --config config/bridge.toml --json
//! ```

use clap::Parser;
use simio_bridge::bridge::Bridge;
use simio_bridge::error::BridgeError;
use simio_bridge::transport::TransportServer;
use simio_bridge::unit_registry::UnitRegistry;
use simio_common::config::{ConfigLoader, LogLevel};
use simio_common::consts::DEFAULT_CONFIG_PATH;
use simio_common::unit::config::BridgeConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Simulation I/O bridge - cyclic device units behind a TCP endpoint
#[derive(Parser, Debug)]
#[command(name = "simio_bridge")]
#[command(version)]
#[command(about = "Runs simulated device units and serves their I/O to a simulation peer")]
#[command(long_about = None)]
struct Args {
    /// Path to the bridge configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the listen address from the configuration (host:port)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Bridge failed: {}", e);
        eprintln!("simio_bridge: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), BridgeError> {
    let args = Args::parse();

    let mut config = BridgeConfig::load(&args.config)?;
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }

    setup_tracing(&args, config.shared.log_level);
    info!(
        "{} v{} starting with {:?}",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION"),
        args.config
    );

    let listen = config.listen_addr()?;
    let mut bridge = Bridge::new(config, UnitRegistry::with_builtin())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("simio-io")
        .build()?;

    let result = runtime.block_on(async {
        let server = TransportServer::bind(listen, bridge.exchange(), bridge.frame_limits()).await?;

        let shutdown = server.shutdown_token();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            shutdown.cancel();
        })
        .map_err(|e| std::io::Error::other(e.to_string()))?;

        let started = bridge.start_auto();
        info!("{} unit(s) auto-started", started);

        server.run().await;
        Ok::<(), BridgeError>(())
    });

    bridge.shutdown();
    result?;
    info!("Bridge shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
