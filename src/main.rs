use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vidifusion_client::config::Configuration;
use vidifusion_client::events::UserInput;
use vidifusion_client::media::ClockMedia;
use vidifusion_client::tasks::input;
use vidifusion_client::tasks::session::Session;
use vidifusion_client::tasks::socket::WebSocketConnector;

#[derive(Debug, Parser)]
#[command(
    name = "vidifusion-client",
    version,
    about = "Streams processed video frames from the enhancement backend"
)]
struct Args {
    /// Video path or URL, forwarded to the backend as-is
    #[arg(value_name = "VIDEO")]
    video: String,
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the backend WebSocket endpoint
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Media duration in seconds, shown on the timeline
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,
    /// Write the last painted surface to this image file on exit
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},tungstenite=warn,tokio_tungstenite=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        video,
        config,
        endpoint,
        duration,
        snapshot,
        verbose,
    } = Args::parse();
    init_tracing(verbose);

    let mut cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(endpoint) = endpoint {
        cfg.endpoint = endpoint;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::debug!("effective configuration:\n{:#?}", cfg);

    let cancel = CancellationToken::new();
    let (input_tx, input_rx) = mpsc::channel::<UserInput>(16);

    // Commands on stdin; EOF (Ctrl-D or the end of a piped script) ends the session
    if io::stdin().is_terminal() {
        tracing::debug!("reading commands from the terminal");
    } else {
        tracing::debug!("reading commands from piped stdin");
    }
    input::spawn(
        BufReader::new(tokio::io::stdin()),
        input_tx,
        cancel.clone(),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let media = ClockMedia::new(duration);
    let mut session = Session::new(&cfg, video, WebSocketConnector, media)
        .context("failed to set up streaming session")?;
    session
        .run(input_rx, cancel.clone())
        .await
        .context("session failed")?;

    if let Some(path) = snapshot {
        session.surface().save_snapshot(&path)?;
        tracing::info!("wrote surface snapshot to {}", path.display());
    }

    // Give the socket task a moment to send its close frame.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
