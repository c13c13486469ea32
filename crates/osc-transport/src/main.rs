//! OSC transport headless entry point.
//!
//! Loads the configuration, starts a [`Session`] for the configured transport
//! and polls it on a fixed interval until Ctrl-C, printing connection changes
//! and received packets through `tracing`.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML file or defaults, CLI overrides
//!  └─ Session::start()
//!       ├─ udp mode: UdpSendWorker + UdpReceiveWorker (OS threads)
//!       ├─ tcp mode: TcpClientWorker                  (OS thread)
//!       └─ LogSink                                    (OS thread)
//!  └─ poll loop               -- every `ui_refresh_ms` until Ctrl-C
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use osc_core::{describe_packet, encode_message};
use osc_transport::application::Session;
use osc_transport::infrastructure::storage::config::{
    load_config, load_config_from, AppConfig, TransportMode,
};

#[derive(Debug, Parser)]
#[command(name = "osc-transport", version, about = "Send and receive OSC over UDP or TCP")]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, env = "OSC_TRANSPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `[network] mode`.
    #[arg(long, value_enum)]
    mode: Option<TransportMode>,

    /// Overrides `[network] ip`.
    #[arg(long)]
    ip: Option<String>,

    /// OSC address to send once, without arguments, after start.  Repeatable.
    #[arg(long = "send", value_name = "ADDRESS")]
    send: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, load_error) = match &cli.config {
        Some(path) => (
            load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None,
        ),
        None => match load_config() {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
    };
    if let Some(mode) = cli.mode {
        config.network.mode = mode;
    }
    if let Some(ip) = cli.ip {
        config.network.ip = ip;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level)),
        )
        .init();

    if let Some(e) = load_error {
        warn!("using default config: {e}");
    }
    info!("OSC transport starting");

    let refresh = Duration::from_millis(config.app.ui_refresh_ms.max(1));
    let mut session = Session::new(config);
    session.start().context("failed to start transport workers")?;

    for address in &cli.send {
        match encode_message(address, Vec::new()) {
            Ok(packet) => {
                if !session.send(packet) {
                    warn!("could not queue {address}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("OSC transport ready.  Press Ctrl-C to exit.");

    let mut ticker = tokio::time::interval(refresh);
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let update = session.poll();
        for event in &update.events {
            info!("connection {event:?}");
        }
        for packet in &update.packets {
            for line in describe_packet(packet.as_bytes()) {
                debug!("received {line}");
            }
        }
    }

    session.stop();
    info!("OSC transport stopped");
    Ok(())
}
