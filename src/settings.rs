use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EffectsConfig;
use crate::error::InputError;
use crate::protocol::{ClientMessage, MessageSink, SendOutcome};

/// Scaling/enhancement algorithm applied by the backend to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Bilinear,
    Bicubic,
    Lanczos,
    Edsr,
    Fsrcnn,
    Lapsrn,
    Swinir,
}

impl Algorithm {
    pub const ALL: &'static [Self] = &[
        Self::Bilinear,
        Self::Bicubic,
        Self::Lanczos,
        Self::Edsr,
        Self::Fsrcnn,
        Self::Lapsrn,
        Self::Swinir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Lanczos => "lanczos",
            Self::Edsr => "edsr",
            Self::Fsrcnn => "fsrcnn",
            Self::Lapsrn => "lapsrn",
            Self::Swinir => "swinir",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.as_str() == wanted)
            .ok_or_else(|| InputError::UnknownAlgorithm(raw.to_string()))
    }
}

/// The boolean post-processing toggles forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    EdgeDetection,
    MotionCompensation,
    ColorEnhancement,
    DeepLearningEnhancement,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EdgeDetection => "edge-detection",
            Self::MotionCompensation => "motion-compensation",
            Self::ColorEnhancement => "color-enhancement",
            Self::DeepLearningEnhancement => "deep-learning-enhancement",
        })
    }
}

/// Complete effect configuration for the current video.
///
/// Always sent whole; the backend treats the latest message as the full
/// desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(rename = "videoPath")]
    pub video_identity: String,
    pub algorithm: Algorithm,
    pub edge_detection: bool,
    pub motion_compensation: bool,
    pub color_enhancement: bool,
    pub deep_learning_enhancement: bool,
}

impl Settings {
    pub fn new(video_identity: impl Into<String>, effects: &EffectsConfig) -> Self {
        Self {
            video_identity: video_identity.into(),
            algorithm: effects.algorithm,
            edge_detection: effects.edge_detection,
            motion_compensation: effects.motion_compensation,
            color_enhancement: effects.color_enhancement,
            deep_learning_enhancement: effects.deep_learning_enhancement,
        }
    }

    fn effect_mut(&mut self, effect: Effect) -> &mut bool {
        match effect {
            Effect::EdgeDetection => &mut self.edge_detection,
            Effect::MotionCompensation => &mut self.motion_compensation,
            Effect::ColorEnhancement => &mut self.color_enhancement,
            Effect::DeepLearningEnhancement => &mut self.deep_learning_enhancement,
        }
    }

    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::Settings(self.clone())
    }
}

/// Applies effect-setting changes and pushes the full result to the backend.
#[derive(Debug)]
pub struct SettingsDispatcher {
    settings: Settings,
}

impl SettingsDispatcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sends the current settings without changing them.
    pub fn push<S: MessageSink + ?Sized>(&self, sink: &mut S) -> SendOutcome {
        sink.send(&self.settings.to_message())
    }

    pub fn set_algorithm<S: MessageSink + ?Sized>(
        &mut self,
        algorithm: Algorithm,
        sink: &mut S,
    ) -> SendOutcome {
        debug!(%algorithm, "algorithm changed");
        self.settings.algorithm = algorithm;
        self.push(sink)
    }

    /// Sends even when `enabled` matches the current value; every UI change event is mirrored.
    pub fn set_effect<S: MessageSink + ?Sized>(
        &mut self,
        effect: Effect,
        enabled: bool,
        sink: &mut S,
    ) -> SendOutcome {
        debug!(%effect, enabled, "effect toggled");
        *self.settings.effect_mut(effect) = enabled;
        self.push(sink)
    }
}
