use std::path::PathBuf;

use ackwire_common::config::ADDR_ENV;
use ackwire_server::{SecureWsServer, ServerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ackwire-server")]
#[command(about = "Mutual TLS WebSocket acknowledgment server")]
struct Args {
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = ADDR_ENV)]
    addr: Option<String>,

    /// Server certificate chain (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Server private key (PEM)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Bundle of authorities trusted to sign client certificates (PEM)
    #[arg(long)]
    ca: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {path:?}"))?,
            None => ServerConfig::new(),
        };

        if let Some(addr) = &self.addr {
            config.addr = addr.clone();
        }
        if let Some(cert) = &self.cert {
            config.cert_path.cert_path = cert.clone();
        }
        if let Some(key) = &self.key {
            config.cert_path.key_path = key.clone();
        }
        if let Some(ca) = &self.ca {
            config.cert_path.ca_path = ca.clone();
        }
        Ok(config)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting ackwire server...");
    let config = args.server_config()?;
    let server = SecureWsServer::new(config).context("Failed to create server")?;
    info!("Binding {}", server.addr());
    server
        .run_until(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
