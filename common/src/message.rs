use std::fmt;

use tokio_tungstenite::tungstenite;

/// Prefix the server puts in front of every acknowledged payload
pub const ACK_PREFIX: &str = "ACK - ";

/// Type tag carried by every data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text frame
    Text,
    /// Opaque binary frame
    Binary,
}

/// One application message: an opaque payload plus its type tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text payload
    Text(String),
    /// Binary payload
    Binary(Vec<u8>),
}

impl Message {
    /// Creates a text message
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Creates a binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Type tag of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
        }
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    /// Payload as text, for text messages
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    /// Builds the acknowledgment for this message: [`ACK_PREFIX`] followed by
    /// the original payload, with the same type tag
    pub fn acknowledgment(&self) -> Message {
        match self {
            Message::Text(text) => Message::Text(format!("{ACK_PREFIX}{text}")),
            Message::Binary(data) => {
                let mut payload = Vec::with_capacity(ACK_PREFIX.len() + data.len());
                payload.extend_from_slice(ACK_PREFIX.as_bytes());
                payload.extend_from_slice(data);
                Message::Binary(payload)
            }
        }
    }

    /// Converts a data frame; control frames yield `None`
    pub(crate) fn from_frame(frame: tungstenite::Message) -> Option<Self> {
        match frame {
            tungstenite::Message::Text(text) => Some(Message::Text(text)),
            tungstenite::Message::Binary(data) => Some(Message::Binary(data)),
            _ => None,
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => tungstenite::Message::Text(text),
            Message::Binary(data) => tungstenite::Message::Binary(data),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(text) => f.write_str(text),
            Message::Binary(data) => write!(f, "<{} bytes binary>", data.len()),
        }
    }
}
