//! Lifecycle of the single streaming channel to the backend.
//!
//! The manager never touches a socket itself: a [`Connector`] opens channels
//! and reports their lifecycle as [`ChannelEvent`]s, which the owner feeds
//! back through [`ConnectionManager::handle_event`]. Each channel carries a
//! generation number and only the live generation is acted on, so a torn-down
//! socket that reports its close late cannot schedule a second channel.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ReconnectConfig;
use crate::events::{ChannelEvent, SocketEvent};
use crate::protocol::{
    ClientMessage, MessageSink, SendOutcome, ServerMessage, parse_server_message,
};
use crate::settings::SettingsDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Exponential reconnect delays: `base * 2^attempts`, for at most `max_attempts` tries.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay before the next attempt, consuming it. `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempts);
        let delay = self.base_delay.saturating_mul(factor);
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self::new(cfg.max_attempts, cfg.base_delay)
    }
}

/// Owner's handle on one open (or opening) channel.
///
/// Dropping the handle closes the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ChannelHandle {
    pub fn new(outbound: UnboundedSender<String>, cancel: CancellationToken) -> Self {
        Self { outbound, cancel }
    }

    fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens transport channels on behalf of the [`ConnectionManager`].
pub trait Connector {
    /// Starts opening a channel. Lifecycle events must be reported on `events`
    /// stamped with `generation`; a failed open reports `Error` then `Closed`.
    fn open(
        &mut self,
        url: &Url,
        generation: u64,
        events: UnboundedSender<ChannelEvent>,
    ) -> ChannelHandle;
}

/// What the owner of the connection has to do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    None,
    Opened,
    Frame { data: String, time: Option<f64> },
    Ended,
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Attempts are exhausted; the connection stays closed until a manual reconnect.
    GaveUp,
}

pub struct ConnectionManager<C> {
    connector: C,
    url: Url,
    state: ConnectionState,
    backoff: Backoff,
    generation: u64,
    channel: Option<ChannelHandle>,
    events: UnboundedSender<ChannelEvent>,
    gave_up: bool,
    remote_time: Option<f64>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        url: Url,
        reconnect: &ReconnectConfig,
        events: UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            connector,
            url,
            state: ConnectionState::Idle,
            backoff: Backoff::from(reconnect),
            generation: 0,
            channel: None,
            events,
            gave_up: false,
            remote_time: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once retries are exhausted, until the next successful open.
    pub fn has_given_up(&self) -> bool {
        self.gave_up
    }

    /// The backend's decode position from the most recent frame, if it reports one.
    pub fn remote_time(&self) -> Option<f64> {
        self.remote_time
    }

    /// Tears down any existing channel and starts a new one.
    pub fn connect(&mut self) {
        if let Some(previous) = self.channel.take() {
            debug!(generation = self.generation, "closing previous channel");
            drop(previous);
        }
        self.generation += 1;
        info!(
            url = %self.url,
            generation = self.generation,
            attempt = self.backoff.attempts(),
            "connecting to backend"
        );
        let handle = self
            .connector
            .open(&self.url, self.generation, self.events.clone());
        self.channel = Some(handle);
        self.state = ConnectionState::Connecting;
    }

    /// Manual reconnect. Does not reset the attempt counter; only a successful open does.
    pub fn reconnect_now(&mut self) {
        info!(attempts = self.backoff.attempts(), "manual reconnect requested");
        self.connect();
    }

    /// Closes the live channel for good; no reconnect follows.
    pub fn teardown(&mut self) {
        if self.channel.take().is_some() {
            info!(generation = self.generation, "connection torn down");
        }
        self.state = ConnectionState::Closed;
    }

    pub fn handle_event(
        &mut self,
        event: ChannelEvent,
        settings: &SettingsDispatcher,
    ) -> ConnectionUpdate {
        if event.generation != self.generation || self.channel.is_none() {
            debug!(
                generation = event.generation,
                live = self.generation,
                event = ?event.event,
                "ignoring event from stale channel"
            );
            return ConnectionUpdate::None;
        }

        match event.event {
            SocketEvent::Opened => {
                self.backoff.reset();
                self.gave_up = false;
                self.state = ConnectionState::Open;
                info!(generation = self.generation, "connection opened");
                settings.push(self);
                ConnectionUpdate::Opened
            }
            SocketEvent::Message(text) => self.dispatch(&text),
            SocketEvent::Error(reason) => {
                // The close that follows drives the backoff.
                warn!(generation = self.generation, %reason, "channel error");
                ConnectionUpdate::None
            }
            SocketEvent::Closed => self.on_closed(),
        }
    }

    fn dispatch(&mut self, text: &str) -> ConnectionUpdate {
        match parse_server_message(text) {
            Ok(ServerMessage::Ended) => ConnectionUpdate::Ended,
            Ok(ServerMessage::Frame { data, time }) => {
                if time.is_some() {
                    self.remote_time = time;
                }
                ConnectionUpdate::Frame { data, time }
            }
            Ok(ServerMessage::Error(message)) => {
                warn!(%message, "backend reported an error");
                ConnectionUpdate::None
            }
            Err(err) => {
                warn!(error = %err, len = text.len(), "dropping invalid backend message");
                ConnectionUpdate::None
            }
        }
    }

    fn on_closed(&mut self) -> ConnectionUpdate {
        self.channel = None;
        self.state = ConnectionState::Closed;
        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "connection closed; reconnect scheduled"
                );
                ConnectionUpdate::ScheduleReconnect { attempt, delay }
            }
            None => {
                self.gave_up = true;
                error!(
                    attempts = self.backoff.attempts(),
                    "connection lost, no more retries"
                );
                ConnectionUpdate::GaveUp
            }
        }
    }
}

impl<C> MessageSink for ConnectionManager<C> {
    fn send(&mut self, message: &ClientMessage) -> SendOutcome {
        let channel = match (&self.channel, self.state) {
            (Some(channel), ConnectionState::Open) => channel,
            _ => {
                warn!(state = ?self.state, ?message, "connection not open; message not sent");
                return SendOutcome::Dropped;
            }
        };
        let text = match message.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, ?message, "failed to serialize message");
                return SendOutcome::Dropped;
            }
        };
        if channel.send(text) {
            SendOutcome::Sent
        } else {
            warn!(?message, "channel task gone; message not sent");
            SendOutcome::Dropped
        }
    }
}
