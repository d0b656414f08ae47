//! Command loop hosting a session controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, instrument, warn};

use consonance_ipc::{EngineCommand, EngineEvent, SessionState, SourceRequest};
use consonance_transport::FrameSink;

use crate::controller::SessionController;

/// How long the loop waits for a command before checking session state.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often status is published while a session streams.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Drives a [`SessionController`] from a command channel.
pub struct Engine {
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    controller: SessionController,
    sink: Arc<dyn FrameSink>,
    last_state: SessionState,
    last_status: Instant,
}

impl Engine {
    /// Create a new engine writing every session to `sink`.
    pub fn new(
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        controller: SessionController,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            controller,
            sink,
            last_state: SessionState::Idle,
            last_status: Instant::now(),
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Engine starting");
        self.send_event(EngineEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(COMMAND_POLL_INTERVAL) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.publish_state();
                    if self.last_state.is_streaming() && self.last_status.elapsed() >= STATUS_INTERVAL
                    {
                        self.send_status();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    self.controller.shutdown();
                    break;
                }
            }
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if engine should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::Start { source } => self.start_session(source),
            EngineCommand::Stop => {
                if !self.controller.stop() {
                    debug!("Nothing streaming, ignoring stop command");
                }
            }
            EngineCommand::GetStatus => self.send_status(),
            EngineCommand::ListDevices => self.send_devices(),
            EngineCommand::Shutdown => {
                self.controller.shutdown();
                self.publish_state();
                self.send_event(EngineEvent::Shutdown);
                return false;
            }
        }

        self.publish_state();
        true
    }

    fn start_session(&mut self, source: SourceRequest) {
        match self.controller.start(source, Arc::clone(&self.sink)) {
            Ok(session_id) => {
                // The previous session may have ended inside start; report
                // its final state before the new one.
                self.publish_state();
                self.send_event(EngineEvent::SessionStarted { session_id });
                self.last_status = Instant::now();
            }
            Err(e) => {
                self.send_event(EngineEvent::Error {
                    recoverable: true,
                    message: e.to_string(),
                });
            }
        }
    }

    fn send_status(&mut self) {
        let status = self.controller.status();
        self.send_event(EngineEvent::Status(Box::new(status)));
        self.last_status = Instant::now();
    }

    fn send_devices(&self) {
        match self.controller.list_devices() {
            Ok(devices) => self.send_event(EngineEvent::Devices(devices)),
            Err(e) => self.send_event(EngineEvent::Error {
                recoverable: true,
                message: e.to_string(),
            }),
        }
    }

    fn publish_state(&mut self) {
        let current = self.controller.status().state;
        if current == self.last_state {
            return;
        }

        let previous = std::mem::replace(&mut self.last_state, current.clone());
        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(current),
        });
    }

    fn send_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}
