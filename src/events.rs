use image::RgbaImage;

use crate::settings::{Algorithm, Effect};

/// Raw lifecycle notifications from one socket channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// A [`SocketEvent`] stamped with the generation of the channel that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub generation: u64,
    pub event: SocketEvent,
}

/// User-originated input delivered to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    TogglePlayPause,
    Play,
    Pause,
    Stop,
    /// Continuous timeline drag ("input" on the range control).
    Seek(f64),
    /// The drag gesture ended ("change" on the range control).
    CommitSeek,
    ToggleFullscreen,
    PointerActivity,
    SetAlgorithm(Algorithm),
    SetEffect(Effect, bool),
    Reconnect,
    Status,
    Quit,
}

/// A frame that finished decoding and is ready to paint.
#[derive(Debug)]
pub struct DecodedFrame {
    pub sequence: u64,
    pub image: RgbaImage,
}
