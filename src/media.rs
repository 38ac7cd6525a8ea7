use tokio::time::Instant;

/// The local media element: decode position, play/pause and duration.
pub trait MediaElement {
    /// Current decode position in seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, time: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// Known once metadata has loaded.
    fn duration(&self) -> Option<f64>;
}

/// Wall-clock media element for running without a platform decoder.
///
/// Time advances at 1x while playing and stops at the duration, if one is known.
#[derive(Debug, Clone)]
pub struct ClockMedia {
    position: f64,
    playing_since: Option<Instant>,
    duration: Option<f64>,
}

impl ClockMedia {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            position: 0.0,
            playing_since: None,
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
        }
    }

    fn clamp(&self, time: f64) -> f64 {
        let time = time.max(0.0);
        match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }
}

impl MediaElement for ClockMedia {
    fn current_time(&self) -> f64 {
        match self.playing_since {
            Some(since) => self.clamp(self.position + since.elapsed().as_secs_f64()),
            None => self.position,
        }
    }

    fn set_current_time(&mut self, time: f64) {
        self.position = self.clamp(time);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if self.playing_since.is_some() {
            self.position = self.current_time();
            self.playing_since = None;
        }
    }

    fn is_paused(&self) -> bool {
        self.playing_since.is_none()
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}
