use tracing::info;

/// Re-anchors the local media element to the scrub position of record.
#[derive(Debug, Clone, Copy)]
pub struct DriftCorrector {
    tolerance: f64,
}

impl DriftCorrector {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Returns the time the media element must be moved to, if any.
    ///
    /// Fires only when the gap strictly exceeds the tolerance. The comparison is
    /// on the raw `f64` gap without rounding, so `|10.3 - 10.0|` (slightly above
    /// 0.3 in binary) fires against a 0.3 tolerance.
    pub fn check(&self, media_time: f64, scrub_position: f64) -> Option<f64> {
        let drift = (media_time - scrub_position).abs();
        if drift > self.tolerance {
            info!(
                media_time,
                scrub_position,
                drift,
                "media drifted from scrub position; correcting"
            );
            Some(scrub_position)
        } else {
            None
        }
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(0.3)
    }
}
