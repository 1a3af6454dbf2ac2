//! Error taxonomy shared by the client and the server.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// When in the lifetime of an endpoint an error happened.
///
/// Configuration errors abort startup, establishment errors are fatal to a
/// single connection attempt, session errors affect one open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The endpoint cannot start.
    Configuration,
    /// A connection could not be turned into a session.
    Establishment,
    /// An open session failed to read, write or close.
    Session,
}

/// Errors raised while configuring, establishing or running a session.
#[derive(Debug, Error)]
pub enum Error {
    /// Certificate chain or private key could not be read or used.
    #[error("failed to load credential: {0}")]
    CredentialLoad(String),

    /// No usable certificate ended up in a trust store.
    #[error("trust store error: {0}")]
    TrustStore(String),

    /// Invalid configuration value (address, server name, config file).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr:   String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The listener failed to accept a raw connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The server could not be reached.
    #[error("failed to dial {addr}: {source}")]
    Dial {
        /// Address that was dialed.
        addr:   String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// TLS handshake failed or the peer identity was rejected.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// The HTTP upgrade to the framed channel failed.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(#[source] tungstenite::Error),

    /// Reading the next frame failed.
    #[error("read failed: {0}")]
    Read(#[source] tungstenite::Error),

    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(#[source] tungstenite::Error),

    /// Sending the close frame failed. The transport is released anyway.
    #[error("close failed: {0}")]
    Close(#[source] tungstenite::Error),

    /// The session is no longer open.
    #[error("session is closed")]
    SessionClosed,
}

impl Error {
    /// Returns the lifetime stage this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::CredentialLoad(_) | Error::TrustStore(_) | Error::Config(_) => {
                ErrorClass::Configuration
            }
            Error::Bind { .. }
            | Error::Accept(_)
            | Error::Dial { .. }
            | Error::Handshake(_)
            | Error::Upgrade(_) => ErrorClass::Establishment,
            Error::Read(_) | Error::Write(_) | Error::Close(_) | Error::SessionClosed => {
                ErrorClass::Session
            }
        }
    }

    /// True for errors that mean a client could not connect at all.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Error::Dial { .. } | Error::Handshake(_) | Error::Upgrade(_)
        )
    }
}
