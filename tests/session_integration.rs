use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use vidifusion_client::config::Configuration;
use vidifusion_client::connection::ConnectionState;
use vidifusion_client::events::{ChannelEvent, SocketEvent, UserInput};
use vidifusion_client::playback::PlayState;
use vidifusion_client::settings::{Algorithm, Effect};
use vidifusion_client::tasks::input;
use vidifusion_client::tasks::session::Session;
use vidifusion_client::testkit::{FakeConnector, ManualMedia, OpenedChannel};

type TestSession = Session<FakeConnector, ManualMedia>;

const VIDEO: &str = "/videos/clip.mp4";

fn new_session(cfg: &Configuration) -> (TestSession, UnboundedReceiver<OpenedChannel>) {
    let (connector, opened) = FakeConnector::new();
    let session = Session::new(cfg, VIDEO, connector, ManualMedia::default()).unwrap();
    (session, opened)
}

fn event(channel: &OpenedChannel, event: SocketEvent) -> ChannelEvent {
    ChannelEvent {
        generation: channel.generation,
        event,
    }
}

/// Starts the session and feeds it the open event for its first channel.
fn open_session(
    cfg: &Configuration,
) -> (TestSession, OpenedChannel, UnboundedReceiver<OpenedChannel>) {
    let (mut session, mut opened) = new_session(cfg);
    session.start();
    let mut channel = opened.try_recv().unwrap();
    session.handle_channel_event(event(&channel, SocketEvent::Opened));
    channel.drain_outbound();
    (session, channel, opened)
}

fn spawn_run(
    mut session: TestSession,
) -> (
    Sender<UserInput>,
    CancellationToken,
    JoinHandle<anyhow::Result<TestSession>>,
) {
    let (input_tx, input_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let runner = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            session.run(input_rx, cancel).await?;
            Ok(session)
        }
    });
    (input_tx, cancel, runner)
}

fn jpeg_base64(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 160, 220]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Jpeg).unwrap();
    STANDARD.encode(bytes.into_inner())
}

#[tokio::test(start_paused = true)]
async fn four_closes_back_off_then_open_resets_attempts() {
    let (session, mut opened) = new_session(&Configuration::default());
    let (_input_tx, cancel, runner) = spawn_run(session);

    let mut channel = opened.recv().await.unwrap();
    for expected_secs in [1, 2, 4, 8] {
        channel.emit(SocketEvent::Closed);
        let closed_at = Instant::now();
        let next = opened.recv().await.unwrap();
        assert_eq!(
            next.opened_at - closed_at,
            Duration::from_secs(expected_secs)
        );
        assert!(channel.closed.is_cancelled(), "previous channel left open");
        channel = next;
    }

    channel.emit(SocketEvent::Opened);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let sent = channel.drain_outbound();
    assert_eq!(sent.len(), 1, "expected exactly one settings message");
    assert_eq!(sent[0]["videoPath"], VIDEO);
    assert_eq!(sent[0]["algorithm"], "bilinear");

    cancel.cancel();
    let session = runner.await.unwrap().unwrap();
    assert_eq!(session.connection().reconnect_attempts(), 0);
    assert!(!session.is_connection_lost());
    assert_eq!(session.connection().state(), ConnectionState::Closed);
    assert!(channel.closed.is_cancelled(), "teardown must close the channel");
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_exhausting_retries() {
    let (session, mut opened) = new_session(&Configuration::default());
    let (_input_tx, cancel, runner) = spawn_run(session);

    let mut channel = opened.recv().await.unwrap();
    for expected_secs in [1, 2, 4, 8, 16] {
        channel.emit(SocketEvent::Error("connection refused".into()));
        channel.emit(SocketEvent::Closed);
        let closed_at = Instant::now();
        channel = opened.recv().await.unwrap();
        assert_eq!(
            channel.opened_at - closed_at,
            Duration::from_secs(expected_secs)
        );
    }

    channel.emit(SocketEvent::Closed);
    let more = tokio::time::timeout(Duration::from_secs(120), opened.recv()).await;
    assert!(more.is_err(), "no reconnect may follow the final attempt");

    cancel.cancel();
    let session = runner.await.unwrap().unwrap();
    assert!(session.is_connection_lost());
    assert!(session.connection().has_given_up());
    assert!(!session.is_reconnect_pending());
    assert_eq!(session.connection().reconnect_attempts(), 5);
}

#[tokio::test]
async fn manual_reconnect_recovers_from_terminal_failure() {
    let (mut session, mut opened) = new_session(&Configuration::default());
    session.start();
    let mut channel = opened.try_recv().unwrap();

    for _ in 0..5 {
        session.handle_channel_event(event(&channel, SocketEvent::Closed));
        assert!(session.is_reconnect_pending());
        let _ = session.handle_input(UserInput::Reconnect);
        assert!(!session.is_reconnect_pending());
        channel = opened.try_recv().unwrap();
    }
    session.handle_channel_event(event(&channel, SocketEvent::Closed));
    assert!(session.is_connection_lost());
    assert!(!session.is_reconnect_pending());
    assert!(opened.try_recv().is_err());

    let _ = session.handle_input(UserInput::Reconnect);
    let mut channel = opened.try_recv().unwrap();
    assert_eq!(session.connection().reconnect_attempts(), 5);
    session.handle_channel_event(event(&channel, SocketEvent::Opened));

    assert!(!session.is_connection_lost());
    assert_eq!(session.connection().state(), ConnectionState::Open);
    assert_eq!(session.connection().reconnect_attempts(), 0);
    assert_eq!(channel.drain_outbound().len(), 1);
}

#[tokio::test]
async fn start_is_a_no_op_once_connected() {
    let (mut session, channel, mut opened) = open_session(&Configuration::default());

    session.start();

    assert!(opened.try_recv().is_err());
    assert!(!channel.closed.is_cancelled());
    assert_eq!(session.connection().state(), ConnectionState::Open);
    assert_eq!(session.connection().generation(), channel.generation);
}

#[tokio::test]
async fn ended_right_after_connect_pauses_at_zero_without_sending() {
    let (mut session, mut channel, _opened) = open_session(&Configuration::default());

    session.handle_channel_event(event(
        &channel,
        SocketEvent::Message(r#"{"status":"ended"}"#.into()),
    ));

    assert_eq!(session.playback().state(), PlayState::Paused);
    assert_eq!(session.playback().scrub_position(), 0.0);
    assert_eq!(session.playback().current_label(), "00:00");
    assert!(channel.drain_outbound().is_empty());
    assert_eq!(session.connection().state(), ConnectionState::Open);
}

#[tokio::test]
async fn ended_while_playing_resets_without_sending() {
    let (mut session, mut channel, _opened) = open_session(&Configuration::default());
    let _ = session.handle_input(UserInput::Play);
    let _ = session.handle_input(UserInput::Seek(42.0));
    let _ = session.handle_input(UserInput::CommitSeek);
    let before = channel.drain_outbound();
    assert_eq!(before[0]["action"], "play");
    assert_eq!(before[1]["action"], "seek");
    assert_eq!(before[1]["time"], 42.0);

    session.handle_channel_event(event(
        &channel,
        SocketEvent::Message(r#"{"status":"ended"}"#.into()),
    ));

    assert_eq!(session.playback().state(), PlayState::Paused);
    assert_eq!(session.playback().scrub_position(), 0.0);
    assert!(session.playback().media().paused);
    assert!(channel.drain_outbound().is_empty());
}

#[tokio::test]
async fn play_and_pause_only_toggle_on_change() {
    let (mut session, mut channel, _opened) = open_session(&Configuration::default());

    let _ = session.handle_input(UserInput::Pause);
    assert!(channel.drain_outbound().is_empty());

    let _ = session.handle_input(UserInput::Play);
    let _ = session.handle_input(UserInput::Play);
    let sent = channel.drain_outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], serde_json::json!({"action": "play"}));

    let _ = session.handle_input(UserInput::Stop);
    let sent = channel.drain_outbound();
    assert_eq!(
        sent,
        vec![
            serde_json::json!({"action": "pause"}),
            serde_json::json!({"action": "seek", "time": 0.0}),
        ]
    );
    assert_eq!(session.playback().state(), PlayState::Paused);
}

#[tokio::test]
async fn every_setting_change_sends_full_settings() {
    let (mut session, mut channel, _opened) = open_session(&Configuration::default());

    let _ = session.handle_input(UserInput::SetAlgorithm(Algorithm::Edsr));
    let _ = session.handle_input(UserInput::SetEffect(Effect::MotionCompensation, true));
    let _ = session.handle_input(UserInput::SetEffect(Effect::MotionCompensation, true));

    let sent = channel.drain_outbound();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[2],
        serde_json::json!({
            "videoPath": VIDEO,
            "algorithm": "edsr",
            "edgeDetection": false,
            "motionCompensation": true,
            "colorEnhancement": false,
            "deepLearningEnhancement": false,
        })
    );
    assert_eq!(session.settings().settings().algorithm, Algorithm::Edsr);
}

#[tokio::test]
async fn controls_sent_while_disconnected_are_dropped() {
    let (mut session, mut opened) = new_session(&Configuration::default());
    session.start();
    let mut channel = opened.try_recv().unwrap();

    let _ = session.handle_input(UserInput::TogglePlayPause);
    assert_eq!(session.playback().state(), PlayState::Playing);

    session.handle_channel_event(event(&channel, SocketEvent::Opened));
    let sent = channel.drain_outbound();
    assert_eq!(sent.len(), 1, "only the settings push reaches the backend");
    assert!(sent[0].get("videoPath").is_some());
}

#[tokio::test]
async fn malformed_messages_keep_the_channel_open() {
    let (mut session, channel, mut opened) = open_session(&Configuration::default());

    for text in [
        "not json at all",
        r#"{"foo": 1}"#,
        r#"{"status": "buffering"}"#,
        r#"{"frame": ""}"#,
        r#"{"error": "model failed to load"}"#,
    ] {
        session.handle_channel_event(event(&channel, SocketEvent::Message(text.into())));
    }

    assert_eq!(session.connection().state(), ConnectionState::Open);
    assert_eq!(session.connection().reconnect_attempts(), 0);
    assert!(!channel.closed.is_cancelled());
    assert!(!session.is_reconnect_pending());
    assert!(opened.try_recv().is_err());
    assert_eq!(session.playback().state(), PlayState::Paused);
}

#[tokio::test]
async fn stale_channel_events_are_ignored() {
    let (mut session, first, mut opened) = open_session(&Configuration::default());

    let _ = session.handle_input(UserInput::Reconnect);
    let mut second = opened.try_recv().unwrap();
    assert!(first.closed.is_cancelled());
    assert_eq!(session.connection().state(), ConnectionState::Connecting);

    session.handle_channel_event(event(&first, SocketEvent::Closed));
    assert!(!session.is_reconnect_pending());
    assert_eq!(session.connection().state(), ConnectionState::Connecting);

    session.handle_channel_event(event(
        &first,
        SocketEvent::Message(r#"{"status":"ended"}"#.into()),
    ));
    session.handle_channel_event(event(&second, SocketEvent::Opened));
    assert_eq!(session.connection().state(), ConnectionState::Open);
    assert_eq!(second.drain_outbound().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_are_decoded_and_painted() {
    let mut cfg = Configuration::default();
    cfg.viewport.width = 64;
    cfg.viewport.height = 48;
    let (session, mut opened) = new_session(&cfg);
    let (_input_tx, cancel, runner) = spawn_run(session);

    let channel = tokio::time::timeout(Duration::from_secs(2), opened.recv())
        .await
        .expect("timeout waiting for channel")
        .unwrap();
    channel.emit(SocketEvent::Opened);
    channel.emit_text(format!(
        r#"{{"frame":"{}","time":1.5}}"#,
        jpeg_base64(16, 12)
    ));
    channel.emit_text(r#####"{"frame":"####"}"#####);

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    let session = runner.await.unwrap().unwrap();

    assert_eq!(session.surface().frames_drawn(), 1);
    assert_eq!(session.surface().pixels().dimensions(), (64, 48));
    assert_eq!(session.connection().remote_time(), Some(1.5));
}

#[tokio::test(start_paused = true)]
async fn controls_hide_after_inactivity() {
    let (session, _opened) = new_session(&Configuration::default());
    let (_input_tx, cancel, runner) = spawn_run(session);

    tokio::time::sleep(Duration::from_secs(4)).await;
    cancel.cancel();
    let session = runner.await.unwrap().unwrap();
    assert!(!session.controls().is_visible());
}

#[tokio::test(start_paused = true)]
async fn pointer_activity_keeps_controls_visible() {
    let (session, _opened) = new_session(&Configuration::default());
    let (input_tx, cancel, runner) = spawn_run(session);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    input_tx.send(UserInput::PointerActivity).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    let session = runner.await.unwrap().unwrap();
    assert!(session.controls().is_visible());
}

#[tokio::test(start_paused = true)]
async fn quit_ends_the_session() {
    let (session, mut opened) = new_session(&Configuration::default());
    let (input_tx, _cancel, runner) = spawn_run(session);
    let channel = opened.recv().await.unwrap();

    input_tx.send(UserInput::Quit).await.unwrap();
    let session = tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("session did not stop")
        .unwrap()
        .unwrap();
    assert!(channel.closed.is_cancelled());
    assert_eq!(session.connection().state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn piped_commands_drive_the_session() {
    let (session, mut channel, _opened) = open_session(&Configuration::default());
    let (input_tx, input_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let runner = tokio::spawn({
        let cancel = cancel.clone();
        let mut session = session;
        async move {
            session.run(input_rx, cancel).await?;
            anyhow::Ok(session)
        }
    });

    // A separate token keeps the EOF shutdown from racing the queued quit.
    let input_done = CancellationToken::new();
    let script: &'static [u8] = b"status\nplay\nquit\n";
    input::spawn(script, input_tx, input_done.clone());

    let session = tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("session did not stop")
        .unwrap()
        .unwrap();
    assert!(!cancel.is_cancelled(), "quit ends the session on its own");
    assert_eq!(session.playback().state(), PlayState::Playing);
    assert_eq!(
        channel.drain_outbound(),
        vec![serde_json::json!({"action": "play"})]
    );
    input_done.cancelled().await;
}

#[tokio::test(start_paused = true)]
async fn seeking_holds_the_timeline_against_time_updates() {
    let (mut session, mut channel, mut opened) = open_session(&Configuration::default());
    let _ = session.handle_input(UserInput::Play);
    let _ = session.handle_input(UserInput::Seek(30.0));
    channel.drain_outbound();

    // The element jumps elsewhere while the drag is still in progress.
    session.playback_mut().media_mut().time = 12.0;
    let (input_tx, cancel, runner) = spawn_run(session);
    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();
    drop(input_tx);
    let session = runner.await.unwrap().unwrap();

    assert!(opened.try_recv().is_err(), "running an open session must not reconnect");
    assert!(session.playback().is_seeking());
    assert_eq!(session.playback().current_label(), "00:30");
    assert_eq!(session.playback().scrub_position(), 30.0);
    assert_eq!(session.playback().media().time, 30.0, "drift pulls media back");
}
