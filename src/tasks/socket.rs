use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::connection::{ChannelHandle, Connector};
use crate::events::{ChannelEvent, SocketEvent};

/// Opens each channel as a WebSocket client task.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(
        &mut self,
        url: &Url,
        generation: u64,
        events: UnboundedSender<ChannelEvent>,
    ) -> ChannelHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run(
            url.clone(),
            generation,
            events,
            outbound_rx,
            cancel.clone(),
        ));
        ChannelHandle::new(outbound_tx, cancel)
    }
}

/// Drives one WebSocket connection until it closes or is cancelled.
///
/// Reports `Opened`, every text frame, and `Error`/`Closed` the way a browser
/// socket does: a failure is an `Error` followed by `Closed`. Cancellation
/// closes the socket without reporting anything.
pub async fn run(
    url: Url,
    generation: u64,
    events: UnboundedSender<ChannelEvent>,
    mut outbound: UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let emit = |event: SocketEvent| {
        let _ = events.send(ChannelEvent { generation, event });
    };

    let connected = select! {
        _ = cancel.cancelled() => {
            debug!(generation, "connect cancelled");
            return;
        }
        res = connect_async(url.as_str()) => res,
    };
    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(err) => {
            emit(SocketEvent::Error(format!("connect: {err}")));
            emit(SocketEvent::Closed);
            return;
        }
    };
    emit(SocketEvent::Opened);

    let (mut write, mut read) = stream.split();
    loop {
        select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                debug!(generation, "channel closed locally");
                break;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => emit(SocketEvent::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    debug!(generation, ?frame, "backend closed the channel");
                    emit(SocketEvent::Closed);
                    break;
                }
                None => {
                    emit(SocketEvent::Closed);
                    break;
                }
                Some(Err(err)) => {
                    emit(SocketEvent::Error(format!("read: {err}")));
                    emit(SocketEvent::Closed);
                    break;
                }
                Some(Ok(other)) => trace!(generation, kind = ?other, "ignoring non-text frame"),
            },

            Some(text) = outbound.recv() => {
                if let Err(err) = write.send(Message::Text(text)).await {
                    emit(SocketEvent::Error(format!("send: {err}")));
                    emit(SocketEvent::Closed);
                    break;
                }
            }
        }
    }
}
