use std::path::PathBuf;

use ackwire_client::{console::run_console, ClientConfig, SecureWsClient};
use ackwire_common::config::ADDR_ENV;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ackwire-client")]
#[command(about = "Interactive mutual TLS WebSocket client")]
struct Args {
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address (host:port)
    #[arg(short, long, env = ADDR_ENV)]
    addr: Option<String>,

    /// Name expected in the server certificate (defaults to the host of --addr)
    #[arg(long)]
    server_name: Option<String>,

    /// Client certificate (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key (PEM), if not bundled with the certificate
    #[arg(long)]
    key: Option<PathBuf>,

    /// Bundle of authorities trusted to sign the server certificate (PEM)
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Accept any server certificate. Only for testing.
    #[arg(long)]
    insecure_skip_server_verify: bool,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {path:?}"))?,
            None => ClientConfig::new(),
        };

        if let Some(addr) = &self.addr {
            config.addr = addr.clone();
        }
        if let Some(server_name) = &self.server_name {
            config.server_name = Some(server_name.clone());
        }
        if let Some(cert) = &self.cert {
            config.cert_path.cert_path = cert.clone();
            if self.key.is_none() {
                config.cert_path.key_path = cert.clone();
            }
        }
        if let Some(key) = &self.key {
            config.cert_path.key_path = key.clone();
        }
        if let Some(ca) = &self.ca {
            config.cert_path.ca_path = Some(ca.clone());
        }
        if self.insecure_skip_server_verify {
            config.insecure_skip_server_verify = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they don't interleave with the prompt
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting ackwire client...");
    let config = args.client_config()?;
    let mut client = SecureWsClient::new(config).context("Failed to create client")?;
    client.connect().await.context("Failed to connect")?;

    let reason = run_console(
        &mut client,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    )
    .await;

    info!("Session closed ({:?})", reason);
    Ok(())
}
