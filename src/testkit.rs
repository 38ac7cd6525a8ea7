//! In-memory stand-ins for the socket, the media element and the outbound
//! sink, shared by unit and integration tests.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::connection::{ChannelHandle, Connector};
use crate::events::{ChannelEvent, SocketEvent};
use crate::media::MediaElement;
use crate::protocol::{Action, ClientMessage, MessageSink, SendOutcome};

/// Records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<ClientMessage>,
}

impl RecordingSink {
    /// Control messages only, as `(action, time)` pairs.
    pub fn actions(&self) -> Vec<(Action, Option<f64>)> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::Control(control) => Some((control.action, control.time)),
                ClientMessage::Settings(_) => None,
            })
            .collect()
    }
}

impl MessageSink for RecordingSink {
    fn send(&mut self, message: &ClientMessage) -> SendOutcome {
        self.sent.push(message.clone());
        SendOutcome::Sent
    }
}

/// A media element whose clock only moves when a test moves it.
#[derive(Debug, Clone)]
pub struct ManualMedia {
    pub time: f64,
    pub paused: bool,
    pub duration: Option<f64>,
}

impl Default for ManualMedia {
    fn default() -> Self {
        Self {
            time: 0.0,
            paused: true,
            duration: None,
        }
    }
}

impl MediaElement for ManualMedia {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn set_current_time(&mut self, time: f64) {
        self.time = time;
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

/// One channel opened through [`FakeConnector`].
#[derive(Debug)]
pub struct OpenedChannel {
    pub generation: u64,
    pub opened_at: Instant,
    pub outbound: UnboundedReceiver<String>,
    pub closed: CancellationToken,
    events: UnboundedSender<ChannelEvent>,
}

impl OpenedChannel {
    pub fn emit(&self, event: SocketEvent) {
        let _ = self.events.send(ChannelEvent {
            generation: self.generation,
            event,
        });
    }

    pub fn emit_text(&self, text: impl Into<String>) {
        self.emit(SocketEvent::Message(text.into()));
    }

    /// Outbound text frames sent so far, parsed as JSON.
    pub fn drain_outbound(&mut self) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                out.push(value);
            }
        }
        out
    }
}

/// Connector that hands every opened channel to the test instead of a socket.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    opened: UnboundedSender<OpenedChannel>,
}

impl FakeConnector {
    pub fn new() -> (Self, UnboundedReceiver<OpenedChannel>) {
        let (opened, rx) = mpsc::unbounded_channel();
        (Self { opened }, rx)
    }
}

impl Connector for FakeConnector {
    fn open(
        &mut self,
        _url: &Url,
        generation: u64,
        events: UnboundedSender<ChannelEvent>,
    ) -> ChannelHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let _ = self.opened.send(OpenedChannel {
            generation,
            opened_at: Instant::now(),
            outbound: outbound_rx,
            closed: cancel.clone(),
            events,
        });
        ChannelHandle::new(outbound_tx, cancel)
    }
}
