//! ackwire Server Library
//!
//! Accepts TCP connections, performs the mutual TLS handshake, upgrades the
//! encrypted stream to a WebSocket session at `/`, then acknowledges every
//! message it receives with `"ACK - "` followed by the original payload.
//!
//! Every connection runs in its own task with its own session. A failing
//! client never takes the listener down.
//!
//! # Example
//!
//! ```no_run
//! use ackwire_server::{SecureWsServer, ServerConfig};
//!
//! # async fn run() -> ackwire_common::Result<()> {
//! let server = SecureWsServer::new(ServerConfig::new().with_addr("localhost:8443"))?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

use std::{future::Future, net::SocketAddr, path::Path, time::Duration};

pub use ackwire_common::config::UPGRADE_PATH;
use ackwire_common::{
    config::load_json, Error, Result, Role, ServerCertPath, ServerSecurity, Session,
    DEFAULT_ADDR,
};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::{rustls::pki_types::CertificateDer, server::TlsStream, TlsAcceptor};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{Callback, ErrorResponse, Request, Response},
        http::StatusCode,
    },
};
use tracing::Instrument;

/// A session accepted by the server
pub type ServerSession = Session<TlsStream<TcpStream>>;

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

/// Configuration for the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_addr")]
    pub addr:      String,
    /// Server certificate, key and client CA paths
    #[serde(default)]
    pub cert_path: ServerCertPath,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr:      default_addr(),
            cert_path: ServerCertPath::new(),
        }
    }
}

impl ServerConfig {
    /// Creates a server configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    /// Set the listen address
    pub fn with_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the certificate paths
    pub fn with_cert_path(mut self, cert_path: ServerCertPath) -> Self {
        self.cert_path = cert_path;
        self
    }
}

/// A WebSocket server that only admits clients holding a certificate signed by
/// one of its trusted authorities.
#[derive(Clone)]
pub struct SecureWsServer {
    acceptor: TlsAcceptor,
    addr:     String,
}

impl SecureWsServer {
    /// Creates a server, loading its credentials from the configured paths.
    pub fn new(config: ServerConfig) -> Result<Self> {
        tracing::info!("Creating server with certificates:");
        tracing::info!("  - Server chain: {:?}", config.cert_path.cert_path);
        tracing::info!("  - Server key: {:?}", config.cert_path.key_path);
        tracing::info!("  - Client CA: {:?}", config.cert_path.ca_path);

        let security = ServerSecurity::from_provider(&config.cert_path)?;
        Ok(Self::with_security(security, config.addr))
    }

    /// Creates a server from an already built security configuration
    pub fn with_security(security: ServerSecurity, addr: impl Into<String>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(security.tls_config()),
            addr:     addr.into(),
        }
    }

    /// Returns the address this server binds to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Binds the listen address.
    pub async fn listen(&self) -> Result<Listener> {
        let tcp = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.addr.clone(),
                source,
            })?;

        let listener = Listener {
            tcp,
            acceptor: self.acceptor.clone(),
            addr: self.addr.clone(),
        };
        tracing::info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Starts the server and stops accepting once `shutdown` completes.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.listen().await?.run_until(shutdown).await
    }
}

/// A bound listener handing out sessions
pub struct Listener {
    tcp:      TcpListener,
    acceptor: TlsAcceptor,
    addr:     String,
}

impl Listener {
    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.tcp.local_addr().map_err(|source| Error::Bind {
            addr: self.addr.clone(),
            source,
        })
    }

    /// Accepts the next raw TCP connection
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        self.tcp.accept().await.map_err(Error::Accept)
    }

    /// Accepts the next connection and runs the TLS handshake and upgrade on it
    pub async fn accept_session(&self) -> Result<ServerSession> {
        let (tcp, peer) = self.accept().await?;
        accept_and_upgrade(&self.acceptor, tcp, peer).await
    }

    /// Serves connections, one task per session, until `shutdown` completes.
    /// Sessions already running are left to finish on their own.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Server shutdown signal received, stopping gracefully");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok((tcp, peer)) => {
                        tracing::info!("New connection from {}", peer);
                        tokio::spawn(handle_connection(self.acceptor.clone(), tcp, peer));
                    }
                    Err(e) => {
                        tracing::error!("Connection error: {}", e);
                        // Avoid spinning when accept keeps failing (e.g. fd exhaustion)
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Performs the TLS handshake on a raw connection, enforcing the client
/// certificate check, then upgrades it to a framed session.
pub async fn accept_and_upgrade(
    acceptor: &TlsAcceptor,
    tcp: TcpStream,
    peer: SocketAddr,
) -> Result<ServerSession> {
    let tls = acceptor.accept(tcp).await.map_err(Error::Handshake)?;
    tracing::info!(
        "✓ TLS connection with {} established with client certificate verification",
        peer
    );

    let ws = accept_hdr_async(tls, UpgradePath)
        .await
        .map_err(Error::Upgrade)?;

    Ok(Session::new(ws, Role::Acceptor, peer))
}

/// Reads messages and answers each with its acknowledgment until the peer
/// closes the session. Read and write failures end the session.
pub async fn serve_session<S>(mut session: Session<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!("Starting message loop...");

    loop {
        let msg = match session.recv().await? {
            Some(msg) => msg,
            None => {
                tracing::info!("Client closed the session");
                return Ok(());
            }
        };

        tracing::info!("Recv: {}", msg);
        session.send(msg.acknowledgment()).await?;
    }
}

async fn handle_connection(acceptor: TlsAcceptor, tcp: TcpStream, peer: SocketAddr) {
    let session = match accept_and_upgrade(&acceptor, tcp, peer).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Dropping connection from {}: {}", peer, e);
            return;
        }
    };

    let span = tracing::info_span!("session", id = %session.id(), %peer);
    async move {
        if let Some(leaf) = client_certificate(&session) {
            tracing::debug!("Client certificate: {} bytes DER", leaf.len());
        }
        match serve_session(session).await {
            Ok(()) => tracing::info!("Session ended"),
            Err(e) => tracing::error!("Session ended with error: {}", e),
        }
    }
    .instrument(span)
    .await
}

/// Leaf certificate the client authenticated with
pub fn client_certificate(session: &ServerSession) -> Option<&CertificateDer<'static>> {
    let (_, connection) = session.transport().get_ref();
    connection.peer_certificates()?.first()
}

/// Only lets the upgrade through on [`UPGRADE_PATH`]
struct UpgradePath;

impl Callback for UpgradePath {
    fn on_request(
        self,
        request: &Request,
        response: Response,
    ) -> std::result::Result<Response, ErrorResponse> {
        let path = request.uri().path();
        if path == UPGRADE_PATH {
            return Ok(response);
        }

        tracing::warn!("Refusing upgrade on unknown path {}", path);
        let mut error = ErrorResponse::new(Some(format!("no handler for {path}")));
        *error.status_mut() = StatusCode::NOT_FOUND;
        Err(error)
    }
}
