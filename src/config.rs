use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use url::Url;

use crate::settings::Algorithm;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8768";

/// Upper bound for every configured delay, including the longest reconnect backoff.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// WebSocket endpoint of the frame-processing backend.
    pub endpoint: String,
    /// Reconnection policy after the channel closes.
    pub reconnect: ReconnectConfig,
    /// Local playback drift correction.
    pub drift: DriftConfig,
    /// On-screen controls auto-hide.
    pub controls: ControlsConfig,
    /// Size of the render surface in pixels.
    pub viewport: ViewportConfig,
    /// Frames allowed to decode concurrently before new ones are dropped.
    pub max_pending_frames: usize,
    /// Effect settings sent on the first connect.
    pub effects: EffectsConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.endpoint_url()?;
        ensure!(
            self.max_pending_frames > 0,
            "max-pending-frames must be greater than zero"
        );
        self.reconnect.validate()?;
        self.drift.validate()?;
        ensure!(
            !self.controls.hide_after.is_zero() && self.controls.hide_after <= MAX_DELAY,
            "controls.hide-after must be positive and at most 1 day"
        );
        ensure!(
            self.viewport.width > 0 && self.viewport.height > 0,
            "viewport dimensions must be greater than zero"
        );
        Ok(self)
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("invalid endpoint {:?}", self.endpoint))?;
        // Built without a TLS backend.
        ensure!(
            url.scheme() == "ws",
            "endpoint must use ws://, got {}",
            url.scheme()
        );
        Ok(url)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectConfig::default(),
            drift: DriftConfig::default(),
            controls: ControlsConfig::default(),
            viewport: ViewportConfig::default(),
            max_pending_frames: 2,
            effects: EffectsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Consecutive closes tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnect; doubles per attempt.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl ReconnectConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.max_attempts <= 16,
            "reconnect.max-attempts must be at most 16"
        );
        ensure!(
            !self.base_delay.is_zero(),
            "reconnect.base-delay must be positive"
        );
        let longest = self
            .base_delay
            .checked_mul(1 << self.max_attempts)
            .filter(|d| *d <= MAX_DELAY);
        ensure!(
            longest.is_some(),
            "reconnect.base-delay doubled max-attempts times must be at most 1 day"
        );
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DriftConfig {
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Largest tolerated gap between media time and scrub position, in seconds.
    pub tolerance_secs: f64,
}

impl DriftConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.period.is_zero() && self.period <= MAX_DELAY,
            "drift.period must be positive and at most 1 day"
        );
        ensure!(
            self.tolerance_secs.is_finite() && self.tolerance_secs >= 0.0,
            "drift.tolerance-secs must be a non-negative number"
        );
        Ok(())
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(500),
            tolerance_secs: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ControlsConfig {
    #[serde(with = "humantime_serde")]
    pub hide_after: Duration,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            hide_after: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct EffectsConfig {
    pub algorithm: Algorithm,
    pub edge_detection: bool,
    pub motion_compensation: bool,
    pub color_enhancement: bool,
    pub deep_learning_enhancement: bool,
}
