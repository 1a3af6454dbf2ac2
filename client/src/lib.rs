//! ackwire Client Library
//!
//! Connects to an ackwire server over mutual TLS, upgrades the connection to a
//! WebSocket session and exchanges messages with it. Every message sent is
//! answered by the server with an acknowledgment carrying the original
//! payload.
//!
//! # Example
//!
//! ```no_run
//! use ackwire_client::{ClientConfig, SecureWsClient};
//!
//! # async fn run() -> ackwire_common::Result<()> {
//! let config = ClientConfig::new().with_addr("localhost:8443");
//!
//! let mut client = SecureWsClient::new(config)?;
//! client.connect().await?;
//!
//! let ack = client.send_request("hello").await?;
//! println!("Recv: {}", ack);
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod client;

/// Interactive console
pub mod console;

pub use client::*;
// Re-export important types from ackwire-common for convenience
pub use ackwire_common::{ClientCertPath, Error, Message, MessageKind, Result, DEFAULT_ADDR};
