//! JSON messages exchanged with the frame-processing backend.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Play,
    Pause,
    Seek,
}

/// A playback transition mirrored to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlMessage {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

impl ControlMessage {
    pub fn play() -> Self {
        Self {
            action: Action::Play,
            time: None,
        }
    }

    pub fn pause() -> Self {
        Self {
            action: Action::Pause,
            time: None,
        }
    }

    pub fn seek(time: f64) -> Self {
        Self {
            action: Action::Seek,
            time: Some(time),
        }
    }
}

/// Client → backend payloads. Neither shape carries a type tag on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Settings(Settings),
    Control(ControlMessage),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ControlMessage> for ClientMessage {
    fn from(msg: ControlMessage) -> Self {
        Self::Control(msg)
    }
}

/// Backend → client payloads after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Base64 JPEG plus the backend's decode position, when reported.
    Frame { data: String, time: Option<f64> },
    Ended,
    /// The backend hit an internal failure and is about to close.
    Error(String),
}

#[derive(Debug, Deserialize)]
struct RawServerMessage {
    #[serde(default)]
    frame: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    time: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

const STATUS_ENDED: &str = "ended";

/// Validates one inbound text frame.
///
/// `status: "ended"` wins over any frame in the same message. An empty
/// `frame` string counts as absent.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let raw: RawServerMessage = serde_json::from_str(text)?;

    if raw.status.as_deref() == Some(STATUS_ENDED) {
        return Ok(ServerMessage::Ended);
    }
    if let Some(data) = raw.frame.filter(|f| !f.is_empty()) {
        return Ok(ServerMessage::Frame {
            data,
            time: raw.time,
        });
    }
    if let Some(message) = raw.error {
        return Ok(ServerMessage::Error(message));
    }
    match raw.status {
        Some(status) => Err(ProtocolError::UnknownStatus(status)),
        None => Err(ProtocolError::MissingPayload),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The channel was not open; the message was discarded.
    Dropped,
}

/// Fire-and-forget outbound path to the backend.
pub trait MessageSink {
    fn send(&mut self, message: &ClientMessage) -> SendOutcome;
}
