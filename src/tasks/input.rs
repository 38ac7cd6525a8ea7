use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::InputError;
use crate::events::UserInput;
use crate::settings::{Algorithm, Effect};

/// Parses one command line into a [`UserInput`].
pub fn parse_command(line: &str) -> Result<UserInput, InputError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err(InputError::Empty);
    };
    let arg = words.next();

    let input = match command.to_ascii_lowercase().as_str() {
        "toggle" | "space" => UserInput::TogglePlayPause,
        "play" => UserInput::Play,
        "pause" => UserInput::Pause,
        "stop" => UserInput::Stop,
        "seek" => {
            let time = arg
                .and_then(|raw| raw.parse::<f64>().ok())
                .filter(|t| t.is_finite())
                .ok_or(InputError::BadArgument {
                    command: "seek",
                    expected: "a time in seconds",
                })?;
            UserInput::Seek(time)
        }
        "commit" => UserInput::CommitSeek,
        "fullscreen" | "f" => UserInput::ToggleFullscreen,
        "move" => UserInput::PointerActivity,
        "algorithm" => {
            let raw = arg.ok_or(InputError::BadArgument {
                command: "algorithm",
                expected: "an algorithm name",
            })?;
            UserInput::SetAlgorithm(raw.parse::<Algorithm>()?)
        }
        "edge" => UserInput::SetEffect(Effect::EdgeDetection, switch("edge", arg)?),
        "motion" => UserInput::SetEffect(Effect::MotionCompensation, switch("motion", arg)?),
        "color" => UserInput::SetEffect(Effect::ColorEnhancement, switch("color", arg)?),
        "deep" => UserInput::SetEffect(Effect::DeepLearningEnhancement, switch("deep", arg)?),
        "reconnect" => UserInput::Reconnect,
        "status" => UserInput::Status,
        "quit" | "exit" => UserInput::Quit,
        _ => return Err(InputError::UnknownCommand(command.to_string())),
    };
    Ok(input)
}

fn switch(command: &'static str, arg: Option<&str>) -> Result<bool, InputError> {
    match arg.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "true" | "1") => Ok(true),
        Some("off" | "false" | "0") => Ok(false),
        _ => Err(InputError::BadArgument {
            command,
            expected: "on or off",
        }),
    }
}

/// Spawns [`run`] over any line source: a terminal, a pipe or a script.
pub fn spawn<R>(
    reader: R,
    to_session: Sender<UserInput>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = run(reader, to_session, cancel).await {
            warn!("command input failed: {err:#}");
        }
    })
}

/// Forwards parsed command lines until EOF, then requests shutdown.
pub async fn run<R>(
    reader: R,
    to_session: Sender<UserInput>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read command input")?,
        };
        let Some(line) = line else {
            info!("input closed; initiating shutdown");
            cancel.cancel();
            break;
        };
        match parse_command(&line) {
            Ok(input) => {
                if to_session.send(input).await.is_err() {
                    break;
                }
            }
            Err(InputError::Empty) => {}
            Err(err) => warn!(error = %err, "ignoring command"),
        }
    }
    Ok(())
}
