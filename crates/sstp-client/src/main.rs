//! SSTP Client
//!
//! Tunnels PPP through an SSTP gateway: HTTPS upgrade, SSTP control
//! channel with crypto binding, then bidirectional relay between the
//! TLS stream and a local pppd.

mod config;
mod handshake;
mod pppd;
mod session;
mod tls;

use anyhow::{Context, Result};
use config::Config;
use session::Session;
use std::path::PathBuf;
use tls::RustlsTransport;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err:#}");
            std::process::exit(1);
        }
    };

    let default_level = match config.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("==============================================");
    info!("   SSTP Client v{}", env!("CARGO_PKG_VERSION"));
    info!("==============================================");
    info!("");
    info!("Gateway: {}:{}", config.server, config.port);
    info!("PPP daemon: {}", config.pppd_path.display());
    info!("");

    if let Err(err) = run_client(config).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
    info!("disconnected");
}

async fn run_client(config: Config) -> Result<()> {
    let mut transport = RustlsTransport::connect(&config.server, config.port).await?;
    handshake::negotiate(&mut transport, &config.server)
        .await
        .context("HTTPS upgrade failed")?;

    let session = Session::new(Box::new(transport), config);
    session.run().await?;
    Ok(())
}
