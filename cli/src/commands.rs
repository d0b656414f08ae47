//! Request/response helpers over the engine channels.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use tracing::{debug, instrument};

use consonance_ipc::{AudioDevice, EngineCommand, EngineEvent, SessionStatus, SourceRequest};

use crate::AppState;

/// How long to wait for a plain reply from the engine.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Start can include the bounded sink-readiness wait.
const START_TIMEOUT: Duration = Duration::from_secs(15);

fn send(state: &AppState, command: EngineCommand) -> anyhow::Result<()> {
    state
        .command_tx
        .send(command)
        .map_err(|e| anyhow!("Failed to send command: {}", e))
}

/// Wait for the first event `pick` accepts, skipping the rest.
fn await_event<T>(
    state: &AppState,
    timeout: Duration,
    what: &str,
    mut pick: impl FnMut(EngineEvent) -> Option<anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let deadline = Instant::now() + timeout;
    let rx = state.event_rx.lock();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx
            .recv_timeout(remaining)
            .with_context(|| format!("Timeout waiting for {what}"))?;
        if let Some(result) = pick(event) {
            return result;
        }
    }
}

/// Get the playback devices available for loopback capture.
#[instrument(skip(state))]
pub fn list_devices(state: &AppState) -> anyhow::Result<Vec<AudioDevice>> {
    send(state, EngineCommand::ListDevices)?;
    await_event(state, REPLY_TIMEOUT, "devices", |event| match event {
        EngineEvent::Devices(devices) => Some(Ok(devices)),
        EngineEvent::Error { message, .. } => Some(Err(anyhow!(message))),
        _ => None,
    })
}

/// Start a session and return its id.
#[instrument(skip(state))]
pub fn start_session(state: &AppState, source: SourceRequest) -> anyhow::Result<u64> {
    send(state, EngineCommand::Start { source })?;
    await_event(state, START_TIMEOUT, "session start", |event| match event {
        EngineEvent::SessionStarted { session_id } => Some(Ok(session_id)),
        EngineEvent::Error { message, .. } => Some(Err(anyhow!(message))),
        _ => None,
    })
}

/// Stop the current session.
#[instrument(skip(state))]
pub fn stop_session(state: &AppState) -> anyhow::Result<()> {
    debug!("stop_session command");
    send(state, EngineCommand::Stop)
}

/// Get the current session status.
pub fn get_status(state: &AppState) -> anyhow::Result<SessionStatus> {
    send(state, EngineCommand::GetStatus)?;
    await_event(state, REPLY_TIMEOUT, "status", |event| match event {
        EngineEvent::Status(status) => Some(Ok(*status)),
        _ => None,
    })
}

/// Poll status until the session is no longer starting or streaming.
pub fn wait_for_stop(state: &AppState, timeout: Duration) -> anyhow::Result<SessionStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = get_status(state)?;
        if status.state.is_stopped() || status.state.is_idle() {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            bail!("Session still {} after {:?}", status.state.name(), timeout);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
