//! Scene runtime
//!
//! Drives a [`SceneEngine`] from a single tokio task: change events from the
//! bus, capture commands, the engine's next timer deadline and the shutdown
//! signal are multiplexed with `select!`, so the engine itself never needs
//! locking.

use chrono::Utc;
use scene_core::Event;
use scene_engine::SceneEngine;
use scene_event_bus::EventBus;
use scene_store::PointStore;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Wait used when no timer is pending
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// A command for the engine with a channel for its reply
#[derive(Debug)]
pub struct CommandRequest {
    pub command: String,
    pub message: Value,
    /// Receives the reply, `None` when the command has none
    pub reply: oneshot::Sender<Option<Value>>,
}

impl CommandRequest {
    pub fn new(
        command: impl Into<String>,
        message: Value,
    ) -> (Self, oneshot::Receiver<Option<Value>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                command: command.into(),
                message,
                reply,
            },
            rx,
        )
    }
}

/// Runtime owning the engine and its change-feed subscription
pub struct SceneRuntime<S: PointStore> {
    engine: SceneEngine<S>,
    events: broadcast::Receiver<Event<Value>>,
}

impl<S: PointStore + 'static> SceneRuntime<S> {
    /// Create a runtime; subscribes to the bus immediately so no change
    /// fired after this call is missed
    pub fn new(engine: SceneEngine<S>, event_bus: &EventBus) -> Self {
        Self {
            engine,
            events: event_bus.subscribe_all(),
        }
    }

    /// Start the engine and process input until shutdown
    ///
    /// Returns the engine after all of its timers were cancelled.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<CommandRequest>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SceneEngine<S> {
        info!("Starting scene runtime");
        self.engine.advance_to(Utc::now());
        if let Err(e) = self.engine.start() {
            error!(error = %e, "Failed to load scenes");
        }

        let mut commands_open = true;
        loop {
            let deadline = self.engine.next_deadline();
            let wait = deadline
                .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAIT);

            tokio::select! {
                event = self.events.recv() => match event {
                    Ok(event) => {
                        self.engine.advance_to(Utc::now());
                        self.engine.on_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Scene runtime lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event bus closed, stopping scene runtime");
                        break;
                    }
                },
                request = commands.recv(), if commands_open => match request {
                    Some(request) => {
                        self.engine.advance_to(Utc::now());
                        let reply = self.engine.handle_command(&request.command, &request.message);
                        if request.reply.send(reply).is_err() {
                            debug!(command = %request.command, "Reply receiver dropped");
                        }
                    }
                    None => {
                        debug!("Command channel closed");
                        commands_open = false;
                    }
                },
                _ = tokio::time::sleep(wait), if deadline.is_some() => {
                    self.engine.advance_to(Utc::now());
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.engine.shutdown();
        info!("Scene runtime stopped");
        self.engine
    }
}
