use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use vidifusion_client::config::{EffectsConfig, ReconnectConfig};
use vidifusion_client::connection::{ConnectionManager, ConnectionState, ConnectionUpdate};
use vidifusion_client::events::{ChannelEvent, SocketEvent};
use vidifusion_client::settings::{Settings, SettingsDispatcher};
use vidifusion_client::tasks::socket::WebSocketConnector;

async fn next_event(rx: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for socket event")
        .expect("event channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn talks_to_a_websocket_backend() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let backend = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let settings = ws.next().await.unwrap().unwrap().into_text().unwrap();
        ws.send(Message::Text(r#"{"frame":"AAAA","time":2.25}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"status":"ended"}"#.into()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
        settings
    });

    let url = Url::parse(&format!("ws://{addr}")).unwrap();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut manager = ConnectionManager::new(
        WebSocketConnector,
        url,
        &ReconnectConfig::default(),
        events_tx,
    );
    let settings = SettingsDispatcher::new(Settings::new(
        "https://cdn.example.net/clip.mp4",
        &EffectsConfig::default(),
    ));

    manager.connect();
    let mut updates = Vec::new();
    loop {
        let update = manager.handle_event(next_event(&mut events_rx).await, &settings);
        let done = matches!(update, ConnectionUpdate::ScheduleReconnect { .. });
        updates.push(update);
        if done {
            break;
        }
    }

    assert_eq!(
        updates,
        vec![
            ConnectionUpdate::Opened,
            ConnectionUpdate::Frame {
                data: "AAAA".into(),
                time: Some(2.25),
            },
            ConnectionUpdate::Ended,
            ConnectionUpdate::ScheduleReconnect {
                attempt: 1,
                delay: Duration::from_secs(1),
            },
        ]
    );
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(manager.remote_time(), Some(2.25));

    let sent: serde_json::Value = serde_json::from_str(&backend.await.unwrap()).unwrap();
    assert_eq!(sent["videoPath"], "https://cdn.example.net/clip.mp4");
    assert_eq!(sent["algorithm"], "bilinear");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_reports_error_then_close() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let url = Url::parse(&format!("ws://{addr}")).unwrap();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut manager = ConnectionManager::new(
        WebSocketConnector,
        url,
        &ReconnectConfig::default(),
        events_tx,
    );

    manager.connect();
    let first = next_event(&mut events_rx).await;
    assert!(matches!(first.event, SocketEvent::Error(_)));
    assert_eq!(first.generation, manager.generation());
    let second = next_event(&mut events_rx).await;
    assert_eq!(second.event, SocketEvent::Closed);
}
