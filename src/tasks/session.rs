use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionUpdate, Connector};
use crate::controls::ControlsVisibility;
use crate::drift::DriftCorrector;
use crate::error::FrameError;
use crate::events::{ChannelEvent, DecodedFrame, UserInput};
use crate::media::MediaElement;
use crate::playback::{PlayState, PlaybackController};
use crate::render::{Surface, decode_frame};
use crate::settings::{Settings, SettingsDispatcher};
use crate::timer::DelayedTask;

const TIME_UPDATE_PERIOD: Duration = Duration::from_millis(250);

type DecodeResult = (u64, Result<RgbaImage, FrameError>);

/// The single owner of connection, settings and playback state.
///
/// Socket I/O and JPEG decoding run elsewhere and report back as events;
/// everything that mutates state happens on the task running [`Session::run`].
pub struct Session<C, M> {
    connection: ConnectionManager<C>,
    settings: SettingsDispatcher,
    playback: PlaybackController<M>,
    drift: DriftCorrector,
    drift_period: Duration,
    controls: ControlsVisibility,
    reconnect: DelayedTask,
    surface: Surface,
    decodes: JoinSet<DecodeResult>,
    max_pending_frames: usize,
    next_sequence: u64,
    last_painted: Option<u64>,
    connection_lost: bool,
    events_rx: UnboundedReceiver<ChannelEvent>,
}

impl<C: Connector, M: MediaElement> Session<C, M> {
    pub fn new(
        cfg: &Configuration,
        video: impl Into<String>,
        connector: C,
        media: M,
    ) -> Result<Self> {
        let url = cfg.endpoint_url()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            connection: ConnectionManager::new(connector, url, &cfg.reconnect, events_tx),
            settings: SettingsDispatcher::new(Settings::new(video, &cfg.effects)),
            playback: PlaybackController::new(media),
            drift: DriftCorrector::new(cfg.drift.tolerance_secs),
            drift_period: cfg.drift.period,
            controls: ControlsVisibility::new(cfg.controls.hide_after),
            reconnect: DelayedTask::new(),
            surface: Surface::new(cfg.viewport.width, cfg.viewport.height),
            decodes: JoinSet::new(),
            max_pending_frames: cfg.max_pending_frames,
            next_sequence: 0,
            last_painted: None,
            connection_lost: false,
            events_rx,
        })
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn settings(&self) -> &SettingsDispatcher {
        &self.settings
    }

    pub fn playback(&self) -> &PlaybackController<M> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController<M> {
        &mut self.playback
    }

    pub fn controls(&self) -> &ControlsVisibility {
        &self.controls
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// True after retries are exhausted, until a manual reconnect succeeds.
    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect.is_armed()
    }

    /// Opens the first channel and shows the media duration if it is already known.
    /// Does nothing once a connection has been attempted.
    pub fn start(&mut self) {
        if self.connection.state() != ConnectionState::Idle {
            return;
        }
        if let Some(duration) = self.playback.media().duration() {
            self.playback.update_duration_display(duration);
        }
        self.connection.connect();
    }

    /// Runs until cancelled or asked to quit, then tears everything down.
    pub async fn run(
        &mut self,
        mut inputs: Receiver<UserInput>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.start();

        let mut drift_tick = interval(self.drift_period);
        drift_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut time_update_tick = interval(TIME_UPDATE_PERIOD);
        time_update_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut inputs_open = true;

        loop {
            select! {
                _ = cancel.cancelled() => break,

                maybe_input = inputs.recv(), if inputs_open => match maybe_input {
                    Some(input) => {
                        if self.handle_input(input).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("input channel closed");
                        inputs_open = false;
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_channel_event(event),

                _ = self.reconnect.fired() => {
                    debug!("reconnect timer fired");
                    self.connection.connect();
                }

                _ = self.controls.wait_hide() => {}

                Some(joined) = self.decodes.join_next() => match joined {
                    Ok((sequence, result)) => self.on_decoded(sequence, result),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => warn!(error = %err, "frame decode task failed"),
                },

                _ = drift_tick.tick() => {
                    self.playback.correct_drift(&self.drift);
                }

                _ = time_update_tick.tick() => {
                    if !self.playback.media().is_paused() {
                        self.playback.on_time_update();
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Applies one user action. `Break` means the session should end.
    pub fn handle_input(&mut self, input: UserInput) -> ControlFlow<()> {
        match input {
            UserInput::TogglePlayPause => self.playback.toggle_play_pause(&mut self.connection),
            UserInput::Play => {
                if self.playback.state() == PlayState::Paused {
                    self.playback.toggle_play_pause(&mut self.connection);
                }
            }
            UserInput::Pause => {
                if self.playback.state() == PlayState::Playing {
                    self.playback.toggle_play_pause(&mut self.connection);
                }
            }
            UserInput::Stop => self.playback.stop(&mut self.connection),
            UserInput::Seek(time) => self.playback.seek(time, &mut self.connection),
            UserInput::CommitSeek => self.playback.commit_seek(),
            UserInput::ToggleFullscreen => {
                let fullscreen = self.playback.toggle_fullscreen();
                info!(fullscreen, "fullscreen toggled");
            }
            UserInput::PointerActivity => self.controls.on_activity(),
            UserInput::SetAlgorithm(algorithm) => {
                self.settings.set_algorithm(algorithm, &mut self.connection);
            }
            UserInput::SetEffect(effect, enabled) => {
                self.settings
                    .set_effect(effect, enabled, &mut self.connection);
            }
            UserInput::Reconnect => {
                self.reconnect.cancel();
                self.connection.reconnect_now();
            }
            UserInput::Status => self.log_status(),
            UserInput::Quit => {
                info!("quit requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match self.connection.handle_event(event, &self.settings) {
            ConnectionUpdate::None => {}
            ConnectionUpdate::Opened => {
                if self.connection_lost {
                    info!("connection recovered");
                }
                self.connection_lost = false;
                self.reconnect.cancel();
            }
            ConnectionUpdate::Frame { data, time } => self.enqueue_frame(data, time),
            ConnectionUpdate::Ended => self.playback.handle_ended(),
            ConnectionUpdate::ScheduleReconnect { attempt, delay } => {
                debug!(
                    attempt,
                    delay = %humantime::format_duration(delay),
                    "arming reconnect timer"
                );
                self.reconnect.arm(delay);
            }
            ConnectionUpdate::GaveUp => {
                self.reconnect.cancel();
                self.connection_lost = true;
            }
        }
    }

    fn enqueue_frame(&mut self, data: String, time: Option<f64>) {
        if self.decodes.len() >= self.max_pending_frames {
            debug!(
                pending = self.decodes.len(),
                ?time,
                "decoder busy; dropping frame"
            );
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.decodes
            .spawn_blocking(move || (sequence, decode_frame(&data)));
    }

    fn on_decoded(&mut self, sequence: u64, result: Result<RgbaImage, FrameError>) {
        match result {
            Ok(image) => self.paint(DecodedFrame { sequence, image }),
            Err(err) => warn!(sequence, error = %err, "skipping undecodable frame"),
        }
    }

    fn paint(&mut self, frame: DecodedFrame) {
        if self.last_painted.is_some_and(|last| frame.sequence <= last) {
            debug!(sequence = frame.sequence, "discarding frame superseded by a newer one");
            return;
        }
        match self.surface.draw(&frame.image) {
            Ok(()) => self.last_painted = Some(frame.sequence),
            Err(err) => warn!(sequence = frame.sequence, error = %err, "failed to paint frame"),
        }
    }

    fn log_status(&self) {
        let settings = self.settings.settings();
        info!(
            connection = ?self.connection.state(),
            attempts = self.connection.reconnect_attempts(),
            lost = self.connection_lost,
            state = ?self.playback.state(),
            position = %self.playback.current_label(),
            duration = %self.playback.total_label(),
            remote_time = ?self.connection.remote_time(),
            algorithm = %settings.algorithm,
            frames = self.surface.frames_drawn(),
            controls_visible = self.controls.is_visible(),
            "status"
        );
    }

    fn shutdown(&mut self) {
        self.connection.teardown();
        self.reconnect.cancel();
        self.controls.cancel();
        self.decodes.abort_all();
        self.playback.media_mut().pause();
        info!(frames = self.surface.frames_drawn(), "session ended");
    }
}
