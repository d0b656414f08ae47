//! ConsoNance: stream a playback device or a test tone through the
//! encode pipeline.

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use consonance::{
    get_status, init_logging, list_devices, start_session, stop_session, version_string,
    wait_for_stop, App, AppState,
};
use consonance_ipc::{PipelineConfig, SessionStatus, SourceRequest, DEFAULT_SINK_CAPACITY};

/// Slack on top of a tone's length for startup and shutdown.
const TONE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "consonance", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Outbound queue capacity in frames.
    #[arg(long, global = true, default_value_t = DEFAULT_SINK_CAPACITY)]
    sink_capacity: usize,

    /// Loopback buffer depth in 20ms periods (0 = 4).
    #[arg(long, global = true, default_value_t = 0)]
    buffer_periods: u32,

    /// Encoder bitrate in kbps.
    #[arg(long, global = true)]
    bitrate_kbps: Option<u32>,

    /// Print the final session status as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List playback devices available for loopback capture.
    Devices,

    /// Play a sine tone through the pipeline.
    Tone {
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        #[arg(long, default_value_t = 1.0)]
        duration: f32,

        #[arg(long, default_value_t = 0.3)]
        amplitude: f32,
    },

    /// Capture what a playback device renders.
    Capture {
        /// Exact device name (default playback device if omitted).
        #[arg(long)]
        device: Option<String>,

        /// Stop after this many seconds instead of waiting for Enter.
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Print the version string.
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if matches!(cli.command, Command::Version) {
        println!("{}", version_string());
        return Ok(());
    }

    init_logging();
    info!("{} starting", version_string());

    let config = PipelineConfig {
        sink_capacity: cli.sink_capacity,
        buffer_periods: cli.buffer_periods,
        bitrate_kbps: cli.bitrate_kbps,
        ..Default::default()
    };
    config.validate().context("Invalid configuration")?;

    let app = App::launch(config)?;
    let result = run(&app.state, cli.command, cli.json);
    let drained = app.shutdown();
    info!(frames = drained.frames, bytes = drained.bytes, "Transport drained");

    result
}

fn run(state: &AppState, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Devices => {
            for device in list_devices(state)? {
                let marker = if device.is_default { " (Default)" } else { "" };
                println!("{}{}", device.name, marker);
            }
        }
        Command::Tone {
            frequency,
            duration,
            amplitude,
        } => {
            let timeout = tone_timeout(duration)?;
            start_session(
                state,
                SourceRequest::Tone {
                    frequency_hz: frequency,
                    duration_secs: duration,
                    amplitude,
                },
            )?;
            let status = wait_for_stop(state, timeout)?;
            print_status(&status, json)?;
        }
        Command::Capture { device, seconds } => {
            start_session(state, SourceRequest::capture(device))?;
            let status = get_status(state)?;
            print_status(&status, json)?;

            match seconds {
                Some(seconds) => thread::sleep(Duration::from_secs(seconds)),
                None => {
                    println!("Capturing, press Enter to stop");
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                }
            }

            stop_session(state)?;
            let status = wait_for_stop(state, Duration::from_secs(5))?;
            print_status(&status, json)?;
        }
        Command::Version => println!("{}", version_string()),
    }
    Ok(())
}

/// How long to wait for a tone of `duration` seconds to finish.
fn tone_timeout(duration: f32) -> anyhow::Result<Duration> {
    let Ok(length) = Duration::try_from_secs_f32(duration) else {
        bail!("Invalid tone duration: {duration} s");
    };
    length
        .checked_add(TONE_GRACE)
        .with_context(|| format!("Tone duration too long: {duration} s"))
}

fn print_status(status: &SessionStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    println!(
        "{} | streaming: {} | device: {} | sent: {} | dropped: {} | encode failures: {}{}",
        status.state.name(),
        status.is_streaming(),
        status.device.as_deref().unwrap_or("none"),
        status.metrics.frames_sent,
        status.metrics.sink_drops,
        status.metrics.encode_failures,
        if status.degraded { " | degraded" } else { "" },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_timeout_adds_grace() {
        assert_eq!(tone_timeout(1.0).unwrap(), Duration::from_secs(6));
        assert_eq!(tone_timeout(0.0).unwrap(), TONE_GRACE);
    }

    #[test]
    fn test_tone_timeout_rejects_unrepresentable_durations() {
        assert!(tone_timeout(1e20).is_err());
        assert!(tone_timeout(-1.0).is_err());
        assert!(tone_timeout(f32::NAN).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["consonance", "tone"]).unwrap();
        assert_eq!(cli.sink_capacity, DEFAULT_SINK_CAPACITY);
        assert!(matches!(
            cli.command,
            Command::Tone { duration, .. } if duration == 1.0
        ));
    }
}
