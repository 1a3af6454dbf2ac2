use std::{io, path::Path, time::Duration};

use ackwire_common::{
    config::{host_of, load_json, UPGRADE_PATH},
    ClientCertPath, ClientSecurity, Error, Message, Result, Role, Session, SessionState,
    DEFAULT_ADDR, DEFAULT_CLOSE_TIMEOUT,
};
use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_tungstenite::{client_async, tungstenite::Error as WsError};

/// A session opened by the client
pub type ClientSession = Session<TlsStream<TcpStream>>;

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_close_timeout_ms() -> u64 {
    saturating_millis(DEFAULT_CLOSE_TIMEOUT)
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address (host:port)
    #[serde(default = "default_addr")]
    pub addr:                        String,
    /// Name checked against the server certificate; the host part of `addr`
    /// when unset
    #[serde(default)]
    pub server_name:                 Option<String>,
    /// Client certificate, key and server CA paths
    #[serde(default)]
    pub cert_path:                   ClientCertPath,
    /// Accept any server certificate. Off unless asked for.
    #[serde(default)]
    pub insecure_skip_server_verify: bool,
    /// How long to wait for the server's close frame when disconnecting
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms:            u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr:                        default_addr(),
            server_name:                 None,
            cert_path:                   ClientCertPath::new(),
            insecure_skip_server_verify: false,
            close_timeout_ms:            default_close_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Creates a client configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    /// Set the server address
    pub fn with_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the name expected in the server certificate
    pub fn with_server_name<S: Into<String>>(mut self, server_name: S) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    /// Set the certificate paths
    pub fn with_cert_path(mut self, cert_path: ClientCertPath) -> Self {
        self.cert_path = cert_path;
        self
    }

    /// Skip server certificate verification
    pub fn with_insecure_skip_server_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_server_verify = skip;
        self
    }

    /// Set the close handshake wait
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Close handshake wait
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Server name to verify, validated for use in the TLS handshake
    pub fn tls_server_name(&self) -> Result<ServerName<'static>> {
        let name = match &self.server_name {
            Some(name) => name.clone(),
            None => host_of(&self.addr)?.to_string(),
        };
        ServerName::try_from(name)
            .map_err(|e| Error::Config(format!("invalid server name: {e}")))
    }
}

/// Dials `addr`, runs the TLS handshake presenting the client credential and
/// upgrades the stream to a framed session.
pub async fn connect(
    addr: &str,
    server_name: ServerName<'static>,
    security: &ClientSecurity,
) -> Result<ClientSession> {
    let tcp = TcpStream::connect(addr).await.map_err(|source| Error::Dial {
        addr: addr.to_string(),
        source,
    })?;
    let peer = tcp.peer_addr().map_err(|source| Error::Dial {
        addr: addr.to_string(),
        source,
    })?;
    tracing::debug!("TCP connected to {}, starting TLS", peer);

    let tls = TlsConnector::from(security.tls_config())
        .connect(server_name, tcp)
        .await
        .map_err(Error::Handshake)?;

    let url = format!("wss://{addr}{UPGRADE_PATH}");
    let (ws, response) = client_async(url, tls).await.map_err(upgrade_error)?;
    tracing::debug!("Upgrade accepted with status {}", response.status());

    Ok(Session::new(ws, Role::Initiator, peer))
}

// With TLS 1.3 the server checks our certificate after the client side of the
// handshake has finished, so its rejection only shows up once we start the
// upgrade.
fn upgrade_error(e: WsError) -> Error {
    match e {
        WsError::Io(io) if is_tls_error(&io) => Error::Handshake(io),
        other => Error::Upgrade(other),
    }
}

fn is_tls_error(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<rustls::Error>())
}

/// A client holding at most one session with the server
pub struct SecureWsClient {
    security:      ClientSecurity,
    addr:          String,
    server_name:   ServerName<'static>,
    close_timeout: Duration,
    session:       Option<ClientSession>,
    requests_sent: u64,
}

impl SecureWsClient {
    /// Creates a client, loading its credentials from the configured paths
    pub fn new(config: ClientConfig) -> Result<Self> {
        tracing::info!("Loading client certificates:");
        tracing::info!("  - Client cert: {:?}", config.cert_path.cert_path);
        tracing::info!("  - Client key: {:?}", config.cert_path.key_path);
        tracing::info!("  - Server CA: {:?}", config.cert_path.ca_path);

        let security =
            ClientSecurity::from_provider(&config.cert_path, config.insecure_skip_server_verify)?;
        Self::with_security(security, config)
    }

    /// Creates a client from an already built security configuration
    pub fn with_security(security: ClientSecurity, config: ClientConfig) -> Result<Self> {
        let server_name = config.tls_server_name()?;
        Ok(Self {
            security,
            close_timeout: config.close_timeout(),
            addr: config.addr,
            server_name,
            session: None,
            requests_sent: 0,
        })
    }

    /// Opens the session. Does nothing when one is already open.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        tracing::info!("Connecting to wss://{}{}", self.addr, UPGRADE_PATH);
        let session = connect(&self.addr, self.server_name.clone(), &self.security).await?;
        tracing::info!("✓ Connected, session {}", session.id());
        self.session = Some(session);
        Ok(())
    }

    /// Whether a session exists and is still open
    pub fn is_connected(&self) -> bool {
        self.session_state() == Some(SessionState::Open)
    }

    /// State of the current session, if any
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    /// Sends `text` and waits for its acknowledgment
    pub async fn send_request(&mut self, text: &str) -> Result<Message> {
        self.send_message(Message::text(text)).await
    }

    /// Sends a message and waits for its acknowledgment
    pub async fn send_message(&mut self, msg: Message) -> Result<Message> {
        let session = self.session.as_mut().ok_or(Error::SessionClosed)?;

        tracing::debug!("Sending request {}: {}", self.requests_sent + 1, msg);
        session.send(msg).await?;
        self.requests_sent += 1;

        match session.recv().await? {
            Some(ack) => Ok(ack),
            None => Err(Error::Read(WsError::ConnectionClosed)),
        }
    }

    /// Runs the close handshake and drops the session
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                tracing::info!("Disconnecting from server...");
                session.close(self.close_timeout).await?;
                tracing::info!("✓ Disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Get connection and usage statistics
    pub fn get_stats(&self) -> ClientStats {
        ClientStats {
            connected:     self.is_connected(),
            addr:          self.addr.clone(),
            requests_sent: self.requests_sent,
            verified:      self.security.verifies_server(),
        }
    }
}

/// Statistics about the client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    /// Whether a session is open
    pub connected:     bool,
    /// Server address the client dials
    pub addr:          String,
    /// Messages written to the server, failed writes excluded
    pub requests_sent: u64,
    /// Whether the server certificate is verified
    pub verified:      bool,
}

impl std::fmt::Display for ClientStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Client Stats: connected={}, addr={}, requests_sent={}, verified={}",
            self.connected, self.addr, self.requests_sent, self.verified
        )
    }
}
