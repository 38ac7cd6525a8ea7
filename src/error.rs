use thiserror::Error;

/// A backend message that cannot be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON for an inbound message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The message carried neither a frame nor a status.
    #[error("message carries neither `frame` nor `status`")]
    MissingPayload,

    /// A status value this client does not understand.
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
}

/// A received frame that could not be painted.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid base64 frame payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decode JPEG frame: {0}")]
    Decode(#[from] image::ImageError),

    /// Resizing onto the surface failed.
    #[error("resize error: {0}")]
    Resize(anyhow::Error),
}

/// A user command line that could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("command {command:?} expects {expected}")]
    BadArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),
}
