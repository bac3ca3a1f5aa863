//! Console front end for the golive engine.
//!
//! Runs the controller on its own thread and exposes a small line
//! protocol on stdin: `start <key> [preset] [host]`, `stop`, `cancel`,
//! `retry`, `rotate <orientation>`, `state`, `quit`. Engine events are
//! printed as they arrive.

use std::io::{self, BufRead, Write};
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use tracing::info;

use golive_engine::{create_controller, NoopInhibitor, OrientationStore};
use golive_ipc::{
    DeviceOrientation, EngineCommand, EngineEvent, Notice, NoticeStyle, Preset, SessionConfig,
};
use golive_transport::RtmpTransportFactory;

/// Default ingest host when the start command does not name one.
const DEFAULT_INGEST_HOST: &str = "live.fastpix.app";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting golive");

    let (command_tx, command_rx) = golive_ipc::command_channel();
    let (event_tx, event_rx) = golive_ipc::event_channel();

    let orientation_path = std::env::temp_dir().join("golive-orientation.json");
    let engine_thread = thread::spawn(move || {
        info!("Engine thread starting");
        let mut controller = create_controller(
            command_rx,
            event_tx,
            Box::new(RtmpTransportFactory),
            Box::new(NoopInhibitor::default()),
            OrientationStore::new(orientation_path),
        );
        controller.run();
        info!("Engine thread stopped");
    });

    let printer = thread::spawn(move || print_events(event_rx));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Ok(Some(command)) => {
                let shutdown = matches!(command, EngineCommand::Shutdown);
                command_tx
                    .send(command)
                    .context("engine is no longer running")?;
                if shutdown {
                    break;
                }
            }
            Ok(None) => print_help(),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    drop(command_tx);
    let _ = engine_thread.join();
    let _ = printer.join();
    Ok(())
}

/// Parse one input line into a command. `Ok(None)` means print help.
fn parse_command(line: &str) -> Result<Option<EngineCommand>> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();

    let command = match verb {
        "start" => {
            let stream_key = parts
                .next()
                .context("usage: start <key> [preset] [host]")?
                .to_string();
            let preset = match parts.next() {
                Some(name) => parse_preset(name)?,
                None => Preset::Hd720,
            };
            let ingest_host = parts
                .next()
                .unwrap_or(DEFAULT_INGEST_HOST)
                .to_string();
            EngineCommand::Start {
                config: SessionConfig {
                    stream_key,
                    preset,
                    ingest_host,
                },
            }
        }
        "stop" => EngineCommand::Stop,
        "cancel" => EngineCommand::Cancel,
        "retry" => EngineCommand::RetryNow,
        "rotate" => {
            let orientation =
                parse_orientation(parts.next().context("usage: rotate <orientation>")?)?;
            EngineCommand::OrientationChanged(orientation)
        }
        "state" => EngineCommand::GetState,
        "quit" | "exit" => EngineCommand::Shutdown,
        "help" => return Ok(None),
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(command))
}

fn parse_preset(name: &str) -> Result<Preset> {
    let preset = match name {
        "1080p" => Preset::Hd1080,
        "720p" => Preset::Hd720,
        "540p" => Preset::Sd540,
        "360p" => Preset::Sd360,
        other => bail!("unknown preset: {other} (use 1080p, 720p, 540p or 360p)"),
    };
    Ok(preset)
}

fn parse_orientation(name: &str) -> Result<DeviceOrientation> {
    let orientation = match name {
        "portrait" => DeviceOrientation::Portrait,
        "portrait-upside-down" => DeviceOrientation::PortraitUpsideDown,
        "landscape-left" => DeviceOrientation::LandscapeLeft,
        "landscape-right" => DeviceOrientation::LandscapeRight,
        other => bail!("unknown orientation: {other}"),
    };
    Ok(orientation)
}

fn print_help() {
    println!("commands:");
    println!("  start <key> [preset] [host]  go live ({DEFAULT_INGEST_HOST} by default)");
    println!("  stop                         end the stream");
    println!("  cancel                       abort a pending connection");
    println!("  retry                        skip the reconnect backoff");
    println!("  rotate <orientation>         report a device rotation");
    println!("  state                        print the current state");
    println!("  quit                         shut down");
}

/// Print engine events until the channel closes.
fn print_events(event_rx: Receiver<EngineEvent>) {
    for event in event_rx.iter() {
        match event {
            EngineEvent::StateChanged {
                previous,
                current,
                presentation,
            } => {
                println!(
                    "[state] {} -> {} | {}",
                    previous.name(),
                    current.name(),
                    presentation.button_label
                );
            }
            EngineEvent::Notice(notice) => print_notice(&notice),
            EngineEvent::Stats(stats) => {
                println!("[stats] {:.1} fps, {} kbps", stats.fps, stats.bitrate_kbps);
            }
            EngineEvent::Ready => println!("[engine] ready (type 'help' for commands)"),
            EngineEvent::Shutdown => {
                println!("[engine] shut down");
                break;
            }
        }
        let _ = io::stdout().flush();
    }
}

fn print_notice(notice: &Notice) {
    let tag = match notice.style {
        NoticeStyle::Success => "ok",
        NoticeStyle::Error => "error",
        NoticeStyle::Warning => "warn",
        NoticeStyle::Info => "info",
    };
    match &notice.message {
        Some(message) => println!("[{tag}] {}: {message}", notice.title),
        None => println!("[{tag}] {}", notice.title),
    }
}
