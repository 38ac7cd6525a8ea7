//! Local playback state mirrored to the backend.
//!
//! The play/pause decision is taken from [`PlayState`], the user's intent,
//! never from the media element. The media element may lag or be paused by
//! something else; the UI and the control messages stay consistent with each
//! other regardless.

use tracing::{debug, info, warn};

use crate::drift::DriftCorrector;
use crate::media::MediaElement;
use crate::protocol::{ClientMessage, ControlMessage, MessageSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
}

impl PlayState {
    /// The button glyph shown for this state: paused media offers "play".
    pub fn icon(self) -> Icon {
        match self {
            Self::Paused => Icon::Play,
            Self::Playing => Icon::Pause,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Play,
    Pause,
}

impl Icon {
    /// SVG path data for a 24x24 view box.
    pub fn svg_path(self) -> &'static str {
        match self {
            Self::Play => "M8,5.14V19.14L19,12.14L8,5.14Z",
            Self::Pause => "M6,19H8V5H6M16,19H18V5H16V19Z",
        }
    }
}

/// Formats seconds as zero-padded `MM:SS`; minutes are not wrapped into hours.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub struct PlaybackController<M> {
    media: M,
    state: PlayState,
    seeking: bool,
    scrub_position: f64,
    scrub_max: Option<f64>,
    current_label: String,
    total_label: String,
    fullscreen: bool,
}

impl<M: MediaElement> PlaybackController<M> {
    pub fn new(media: M) -> Self {
        Self {
            media,
            state: PlayState::Paused,
            seeking: false,
            scrub_position: 0.0,
            scrub_max: None,
            current_label: format_time(0.0),
            total_label: format_time(0.0),
            fullscreen: false,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn icon(&self) -> Icon {
        self.state.icon()
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    pub fn scrub_position(&self) -> f64 {
        self.scrub_position
    }

    pub fn scrub_max(&self) -> Option<f64> {
        self.scrub_max
    }

    pub fn current_label(&self) -> &str {
        &self.current_label
    }

    pub fn total_label(&self) -> &str {
        &self.total_label
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn toggle_play_pause<S: MessageSink + ?Sized>(&mut self, sink: &mut S) {
        match self.state {
            PlayState::Paused => {
                self.state = PlayState::Playing;
                send_control(sink, ControlMessage::play());
                self.media.play();
            }
            PlayState::Playing => {
                self.state = PlayState::Paused;
                send_control(sink, ControlMessage::pause());
                self.media.pause();
            }
        }
        debug!(state = ?self.state, "play/pause toggled");
    }

    /// Pauses, rewinds to zero and tells the backend to pause before seeking.
    pub fn stop<S: MessageSink + ?Sized>(&mut self, sink: &mut S) {
        self.state = PlayState::Paused;
        self.scrub_position = 0.0;
        self.current_label = format_time(0.0);
        send_control(sink, ControlMessage::pause());
        send_control(sink, ControlMessage::seek(0.0));
        self.media.pause();
        self.media.set_current_time(0.0);
        debug!("playback stopped");
    }

    /// One step of a timeline drag. `seeking` stays set until [`commit_seek`](Self::commit_seek).
    pub fn seek<S: MessageSink + ?Sized>(&mut self, time: f64, sink: &mut S) {
        if !time.is_finite() {
            warn!(time, "ignoring non-finite seek target");
            return;
        }
        let time = match self.scrub_max {
            Some(max) => time.clamp(0.0, max),
            None => time.max(0.0),
        };
        self.seeking = true;
        self.scrub_position = time;
        self.current_label = format_time(time);
        send_control(sink, ControlMessage::seek(time));
        self.media.set_current_time(time);
    }

    pub fn commit_seek(&mut self) {
        if self.seeking {
            debug!(position = self.scrub_position, "seek committed");
        }
        self.seeking = false;
    }

    /// The backend reported end of stream; it already knows, so nothing is sent.
    pub fn handle_ended(&mut self) {
        info!("backend reported end of stream");
        self.state = PlayState::Paused;
        self.scrub_position = 0.0;
        self.current_label = format_time(0.0);
        self.media.pause();
    }

    pub fn update_duration_display(&mut self, duration: f64) {
        if !duration.is_finite() || duration < 0.0 {
            debug!(duration, "ignoring unusable media duration");
            return;
        }
        self.scrub_max = Some(duration);
        self.total_label = format_time(duration);
        debug!(duration, label = %self.total_label, "media duration known");
    }

    /// Mirrors the media element's time into the timeline unless the user is dragging it.
    pub fn on_time_update(&mut self) {
        if self.seeking {
            return;
        }
        let time = self.media.current_time();
        self.scrub_position = time;
        self.current_label = format_time(time);
    }

    /// Applies one drift-correction tick. Only the media element moves.
    pub fn correct_drift(&mut self, corrector: &DriftCorrector) -> Option<f64> {
        let corrected = corrector.check(self.media.current_time(), self.scrub_position)?;
        self.media.set_current_time(corrected);
        Some(corrected)
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.fullscreen = !self.fullscreen;
        debug!(fullscreen = self.fullscreen, "fullscreen toggled");
        self.fullscreen
    }
}

fn send_control<S: MessageSink + ?Sized>(sink: &mut S, control: ControlMessage) {
    sink.send(&ClientMessage::Control(control));
}
