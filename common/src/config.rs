use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

/// The address our server listens on and clients dial by default
pub const DEFAULT_ADDR: &str = "localhost:8443";

/// Request path the WebSocket upgrade is served on
pub const UPGRADE_PATH: &str = "/";

/// Environment variable overriding the listen/dial address
pub const ADDR_ENV: &str = "ACKWIRE_ADDR";

const PKI_DIR_ENV: &str = "ACKWIRE_PKI_DIR";
const DEFAULT_PKI_DIR: &str = "pki/pems";

const SERVER_CHAIN_FILE: &str = "localhost.chain.pem";
const SERVER_KEY_FILE: &str = "localhost.key.pem";
const CLIENT_PEM_FILE: &str = "user.client.pem";

fn get_pki_dir() -> PathBuf {
    let dir = env::var(PKI_DIR_ENV).unwrap_or(DEFAULT_PKI_DIR.to_string());
    PathBuf::from(dir)
}

/// Server certificate paths for TLS authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCertPath {
    /// Path to the server certificate chain
    pub cert_path: PathBuf,
    /// Path to the server private key file
    pub key_path:  PathBuf,
    /// Path to the bundle of authorities trusted to sign client certificates
    pub ca_path:   PathBuf,
}

impl ServerCertPath {
    /// Creates ServerCertPath with default certificate locations.
    /// The chain file doubles as the client CA bundle.
    pub fn new() -> Self {
        let base = get_pki_dir();
        Self {
            cert_path: base.join(SERVER_CHAIN_FILE),
            key_path:  base.join(SERVER_KEY_FILE),
            ca_path:   base.join(SERVER_CHAIN_FILE),
        }
    }
}

impl Default for ServerCertPath {
    fn default() -> Self {
        Self::new()
    }
}

/// Certificate paths for client authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertPath {
    /// Path to the client certificate file
    pub cert_path: PathBuf,
    /// Path to the client private key file (may be the certificate file)
    pub key_path:  PathBuf,
    /// Path to the bundle used to verify the server, if any
    pub ca_path:   Option<PathBuf>,
}

impl ClientCertPath {
    /// Creates ClientCertPath with default certificate locations.
    /// The client PEM carries both the certificate and the key.
    pub fn new() -> Self {
        let base = get_pki_dir();
        Self {
            cert_path: base.join(CLIENT_PEM_FILE),
            key_path:  base.join(CLIENT_PEM_FILE),
            ca_path:   Some(base.join(SERVER_CHAIN_FILE)),
        }
    }
}

impl Default for ClientCertPath {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a JSON configuration file into `T`
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = fs::read(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_slice(&raw)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Splits `host:port` and returns the host part, without IPv6 brackets
pub fn host_of(addr: &str) -> Result<&str> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("address {addr:?} is not host:port")))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(Error::Config(format!("address {addr:?} is not host:port")));
    }
    Ok(host.trim_start_matches('[').trim_end_matches(']'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("localhost:8443").unwrap(), "localhost");
        assert_eq!(host_of("[::1]:8443").unwrap(), "::1");
        assert!(host_of("localhost").is_err());
        assert!(host_of(":8443").is_err());
        assert!(host_of("localhost:http").is_err());
    }

    #[test]
    fn test_client_pem_is_combined() {
        let paths = ClientCertPath::new();
        assert_eq!(paths.cert_path, paths.key_path);
        assert!(paths.ca_path.is_some());
    }

    #[test]
    fn test_cert_paths_deserialize() {
        let json = r#"{"cert_path":"a.pem","key_path":"b.pem","ca_path":null}"#;
        let paths: ClientCertPath = serde_json::from_str(json).unwrap();
        assert_eq!(paths.cert_path, PathBuf::from("a.pem"));
        assert_eq!(paths.ca_path, None);
    }
}
