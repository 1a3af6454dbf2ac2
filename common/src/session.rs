//! Framed message session over an established TLS stream, including the
//! cooperative close handshake.

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
    },
    WebSocketStream,
};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    message::Message,
};

/// How long `close` waits for the peer's close frame by default
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Which side of the connection this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The dialing client
    Initiator,
    /// The accepting server
    Acceptor,
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Data frames flow both ways
    Open,
    /// A close frame was sent or received
    Closing,
    /// The transport is finished
    Closed,
}

/// One authenticated, encrypted, bidirectional message channel.
///
/// The session owns its transport. It is released when the session is
/// dropped or consumed by [`Session::close`].
pub struct Session<S> {
    id:        Uuid,
    role:      Role,
    state:     SessionState,
    peer_addr: SocketAddr,
    stream:    WebSocketStream<S>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an upgraded stream in an open session
    pub fn new(stream: WebSocketStream<S>, role: Role, peer_addr: SocketAddr) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!("Session {} opened as {:?} with {}", id, role, peer_addr);
        Self {
            id,
            role,
            state: SessionState::Open,
            peer_addr,
            stream,
        }
    }

    /// Random id used to correlate log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Initiator or acceptor
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Address of the remote endpoint
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The TLS stream underneath the framing
    pub fn transport(&self) -> &S {
        self.stream.get_ref()
    }

    /// Sends one message
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(Error::SessionClosed);
        }

        if let Err(e) = self.stream.send(msg.into()).await {
            if is_fatal(&e) {
                self.state = SessionState::Closed;
            }
            return Err(Error::Write(e));
        }
        Ok(())
    }

    /// Waits for the next data message.
    ///
    /// Returns `Ok(None)` once the peer has closed the session cleanly. Ping
    /// and pong frames are answered by the framing layer and skipped here.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }

        loop {
            match self.stream.next().await {
                None => {
                    self.state = SessionState::Closed;
                    return Ok(None);
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    match &frame {
                        Some(frame) => {
                            tracing::debug!(
                                "Session {} peer sent close ({}): {}",
                                self.id,
                                frame.code,
                                frame.reason
                            )
                        }
                        None => tracing::debug!("Session {} peer sent close", self.id),
                    }
                    // The reply is queued by the framing layer and flushed on the next poll
                    self.state = SessionState::Closing;
                }
                Some(Ok(frame)) => {
                    if let Some(msg) = Message::from_frame(frame) {
                        return Ok(Some(msg));
                    }
                }
                Some(Err(e)) => {
                    let was_closing = self.state == SessionState::Closing;
                    self.state = SessionState::Closed;
                    if was_closing {
                        tracing::debug!("Session {} transport ended during close: {}", self.id, e);
                        return Ok(None);
                    }
                    return Err(Error::Read(e));
                }
            }
        }
    }

    /// Runs the close handshake with a normal-closure code and releases the
    /// transport.
    ///
    /// Waits at most `wait` for the peer's close frame. A failure to send the
    /// close frame is returned, but the transport is released either way.
    pub async fn close(self, wait: Duration) -> Result<()> {
        self.close_with(CloseCode::Normal, "", wait).await
    }

    /// Like [`Session::close`] with an explicit status code and reason
    pub async fn close_with(mut self, code: CloseCode, reason: &str, wait: Duration) -> Result<()> {
        let result = match self.state {
            SessionState::Open => {
                self.state = SessionState::Closing;
                let frame = CloseFrame {
                    code,
                    reason: reason.to_owned().into(),
                };
                self.stream.close(Some(frame)).await.map_err(Error::Close)
            }
            SessionState::Closing | SessionState::Closed => Ok(()),
        };

        if result.is_ok() && self.state == SessionState::Closing {
            let stream = &mut self.stream;
            let drain = async move { while let Some(Ok(_)) = stream.next().await {} };
            if tokio::time::timeout(wait, drain).await.is_err() {
                tracing::debug!(
                    "Session {} peer did not answer close within {:?}",
                    self.id,
                    wait
                );
            }
        }

        self.state = SessionState::Closed;
        tracing::debug!("Session {} closed", self.id);
        result
    }
}

/// Errors after which the framing layer will not accept further writes
fn is_fatal(e: &tungstenite::Error) -> bool {
    !matches!(
        e,
        tungstenite::Error::Capacity(_) | tungstenite::Error::WriteBufferFull(_)
    )
}
