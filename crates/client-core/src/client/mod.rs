//! Call client runtime
//!
//! [`CallClient`] is a cheap, clonable handle to one cooperative event loop.
//! The loop owns the [`CallController`](controller::CallController) and
//! processes user commands, transport events and timer firings strictly one
//! at a time. Commands are acknowledged only after they have been fully
//! processed. When the last handle is dropped the loop runs the unload
//! teardown before it exits.

pub mod builder;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod recovery;
pub mod timer;
pub mod types;


use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::call::CallState;
use crate::error::{ClientError, ClientResult};
use crate::events::CallEvent;
use config::ClientConfig;
use controller::{CallController, ControllerEvent, Providers, TeardownReason};
use types::ControllerSnapshot;

pub use builder::ClientBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Initialize,
    StartCall,
    JoinCall,
    EndCall,
    Shutdown,
}

struct Request {
    command: Command,
    ack: oneshot::Sender<ClientResult<()>>,
}

/// Handle to a running call client
#[derive(Clone)]
pub struct CallClient {
    commands: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<CallEvent>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl CallClient {
    pub(crate) fn spawn(config: ClientConfig, providers: Providers) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ControllerSnapshot::initial());

        let controller = CallController::new(config, providers, queue_tx, events.clone());
        tokio::spawn(run(controller, commands_rx, queue_rx, snapshot_tx));

        Self {
            commands,
            events,
            snapshot,
        }
    }

    async fn send(&self, command: Command) -> ClientResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Request { command, ack })
            .map_err(|_| ClientError::ClientStopped)?;
        done.await.map_err(|_| ClientError::ClientStopped)?
    }

    /// Resolve the role, acquire media and bind the transport
    pub async fn initialize(&self) -> ClientResult<()> {
        self.send(Command::Initialize).await
    }

    /// Caller "start call" affordance
    pub async fn start_call(&self) -> ClientResult<()> {
        self.send(Command::StartCall).await
    }

    /// Callee "join call" affordance
    pub async fn join_call(&self) -> ClientResult<()> {
        self.send(Command::JoinCall).await
    }

    /// "End call" affordance
    pub async fn end_call(&self) -> ClientResult<()> {
        self.send(Command::EndCall).await
    }

    /// Unload hook: full teardown, then stop the event loop
    pub async fn shutdown(&self) -> ClientResult<()> {
        self.send(Command::Shutdown).await
    }

    /// Subscribe to user-facing events
    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> CallState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the controller reaches `state`
    pub async fn wait_for_state(&self, state: CallState) -> ClientResult<ControllerSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| ClientError::ClientStopped)?;
        Ok(snapshot.clone())
    }
}

async fn run(
    mut controller: CallController,
    mut commands: mpsc::UnboundedReceiver<Request>,
    mut queue: mpsc::UnboundedReceiver<ControllerEvent>,
    snapshot: watch::Sender<ControllerSnapshot>,
) {
    debug!("Call client event loop started");
    loop {
        tokio::select! {
            biased;

            request = commands.recv() => {
                let Some(Request { command, ack }) = request else {
                    info!("All client handles dropped, running unload teardown");
                    controller.teardown(TeardownReason::Unload);
                    snapshot.send_replace(controller.snapshot());
                    break;
                };
                debug!(?command, state = ?controller.state(), "Processing command");
                let result = match command {
                    Command::Initialize => controller.initialize().await,
                    Command::StartCall => controller.start_call(),
                    Command::JoinCall => controller.join_call().await,
                    Command::EndCall => controller.end_call(),
                    Command::Shutdown => {
                        controller.teardown(TeardownReason::Unload);
                        Ok(())
                    }
                };
                snapshot.send_replace(controller.snapshot());
                let _ = ack.send(result);
                if command == Command::Shutdown {
                    break;
                }
            }
            Some(event) = queue.recv() => {
                controller.handle_event(event).await;
                snapshot.send_replace(controller.snapshot());
            }
        }
    }
    debug!("Call client event loop stopped");
}
