//! ackwire Common Library
//!
//! This crate provides the pieces shared by the ackwire client and server:
//!
//! - Error taxonomy for configuration, establishment and session failures
//! - Certificate path configuration and the PEM credential provider
//! - rustls configurations enforcing mutual TLS
//! - The message model and the framed session with its close handshake
//!
//! # Features
//!
//! - **Mutual TLS**: the server always requires and verifies a client
//!   certificate; the client always presents one
//! - **Framed messages**: after the TLS handshake the stream is upgraded to a
//!   WebSocket channel carrying text and binary messages
//! - **Bounded close**: either side can start the close handshake, which waits
//!   a bounded time for the peer before releasing the transport

/// Configuration structures and defaults
pub mod config;

/// Credential provider: PEM chains, keys and trust stores
pub mod credentials;

/// Error taxonomy
pub mod error;

/// Application messages
pub mod message;

/// TLS configuration for both endpoints
pub mod security;

/// Framed session and close handshake
pub mod session;

/// Generated certificates for tests
#[cfg(any(test, feature = "test-util"))]
pub mod test_pki;

// Re-export commonly used types for convenience
pub use config::{ClientCertPath, ServerCertPath, DEFAULT_ADDR};
pub use credentials::{CredentialBundle, CredentialProvider, TrustStore};
pub use error::{Error, ErrorClass, Result};
pub use message::{Message, MessageKind, ACK_PREFIX};
pub use security::{ClientSecurity, ServerSecurity, ServerVerification};
pub use session::{Role, Session, SessionState, DEFAULT_CLOSE_TIMEOUT};
