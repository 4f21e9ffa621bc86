// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Groundlink WebSocket server - stream live flight telemetry to browsers.
//!
//! Runs a periodic sample generator and fans every encoded sample out to all
//! connected WebSocket clients as binary frames.
//!
//! # Usage
//!
//! ```bash
//! # Start on default port 8080, serving ./web
//! groundlink-ws
//!
//! # Custom port and sample period
//! groundlink-ws --port 9090 --period-ms 50
//!
//! # Using configuration file
//! groundlink-ws --config groundlink.toml
//! ```
//!
//! # Protocol
//!
//! Every server frame is binary:
//!
//! ```text
//! [category u8][tick u32 LE][payload: f32/u32 LE fields]
//!
//! 0x00 orientation  roll pitch yaw                  (17 bytes)
//! 0x01 position     altitude lat lng laser          (21 bytes)
//! 0x02 flight mode  mode                            ( 9 bytes)
//! 0x03 battery      volts                           ( 9 bytes)
//! 0x04 airspeed     m/s                             ( 9 bytes)
//! ```

mod handlers;
mod routes;
mod socket;

use clap::{Parser, Subcommand};
use groundlink::{ConfigError, Relay, SampleGenerator, StreamConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Groundlink WebSocket telemetry server
#[derive(Parser, Debug, Clone)]
#[command(name = "groundlink-ws")]
#[command(about = "Groundlink - stream binary flight telemetry to browsers")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP / WebSocket server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Sample period in milliseconds
    #[arg(long)]
    period_ms: Option<u64>,

    /// Directory of browser assets
    #[arg(short, long)]
    web_dir: Option<PathBuf>,

    /// Per-client queue bound (0 = unbounded)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Maximum concurrent WebSocket connections
    #[arg(long)]
    max_clients: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "groundlink.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Shared application state
pub struct AppState {
    relay: Arc<Relay>,
    config: StreamConfig,
    shutdown: CancellationToken,
    /// Connections holding a [`ClientSlot`], upgraded or not.
    clients: AtomicUsize,
}

impl AppState {
    fn new(config: StreamConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new(config.queue_capacity)),
            config,
            shutdown: CancellationToken::new(),
            clients: AtomicUsize::new(0),
        }
    }

    /// Claim a connection slot, or `None` if `max_clients` are taken.
    fn try_reserve_client(self: &Arc<Self>) -> Option<ClientSlot> {
        let max = self.config.max_clients;
        self.clients
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(ClientSlot {
            state: self.clone(),
        })
    }
}

/// Reserved connection slot, released on drop.
pub struct ClientSlot {
    state: Arc<AppState>,
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.state.clients.fetch_sub(1, Ordering::AcqRel);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command.clone() {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    // Setup logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Groundlink WebSocket server v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.listen_addr();
    let state = Arc::new(AppState::new(config));
    let shutdown = state.shutdown.clone();

    // Sample generator
    let generator = SampleGenerator::from_config(&state.config);
    let producer = tokio::spawn(generator.run(state.relay.clone(), shutdown.clone()));

    // Ctrl+C cancels the generator and every session
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_token.cancel();
    });

    let app = routes::build_router(state.clone());

    info!("WebSocket endpoint: ws://{}/ws", addr);
    info!("Web UI: http://{}/", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    let last_tick = producer.await?;
    let stats = state.relay.stats().snapshot();
    info!(
        "Stopped at tick {}: {} messages published ({:.1} msg/s), {} frames fanned out, {} evicted",
        last_tick,
        stats.messages_published,
        stats.messages_per_second(),
        stats.frames_fanned_out,
        stats.messages_evicted
    );

    Ok(())
}

/// Load the config file (if any) and apply command line overrides.
fn build_config(args: &Args) -> Result<StreamConfig, ConfigError> {
    let mut config = match args.config {
        Some(ref path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ref bind) = args.bind {
        config.bind = bind.clone();
    }
    if let Some(period_ms) = args.period_ms {
        config.sample_period_ms = period_ms;
    }
    if let Some(ref web_dir) = args.web_dir {
        config.web_dir = web_dir.clone();
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&StreamConfig::default())?;

    let content = format!(
        r#"# Groundlink Configuration
# Generated by groundlink-ws gen-config
#
# categories: orientation_position, position, flight_mode, battery_voltage, airspeed
# queue_capacity: 0 = unbounded

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match StreamConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Listen:     {}", config.listen_addr());
            println!("Period:     {} ms", config.sample_period_ms);
            println!("Categories: {:?}", config.categories);
            println!("Web dir:    {}", config.web_dir.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
