//! Async driver for the interaction controller.
//!
//! One task owns the [`InteractionController`] and processes the inbox one
//! message at a time, waking up in between only when a controller timer is
//! due. The app talks to it through a cloneable [`ControllerHandle`].

use crate::error::{InteractionError, Result};
use crate::pipeline::coordinator::InteractionController;
use crate::pipeline::messages::{ControllerMessage, LeafEventSink, SessionCommand};
use crate::runtime::{ControllerSnapshot, RuntimeEvent};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The controller inbox before the controller task is spawned.
///
/// Create it first so leaves and the generation dispatcher can be given a
/// [`LeafEventSink`] before the controller exists.
#[derive(Debug)]
pub struct ControllerInbox {
    tx: mpsc::UnboundedSender<ControllerMessage>,
    rx: mpsc::UnboundedReceiver<ControllerMessage>,
}

impl Default for ControllerInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerInbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sink(&self) -> LeafEventSink {
        LeafEventSink::new(self.tx.clone())
    }

    /// Spawn the controller task. Must be called inside a tokio runtime.
    pub fn spawn(self, controller: InteractionController) -> (ControllerHandle, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let handle = ControllerHandle {
            tx: self.tx,
            cancel: cancel.clone(),
            state_rx: controller.observer().subscribe_state(),
            events_tx: controller.observer().events_sender(),
        };
        let task = tokio::spawn(run_controller(controller, self.rx, cancel));
        (handle, task)
    }
}

/// App-side handle to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerMessage>,
    cancel: CancellationToken,
    state_rx: watch::Receiver<ControllerSnapshot>,
    events_tx: broadcast::Sender<RuntimeEvent>,
}

impl ControllerHandle {
    fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(ControllerMessage::Command(command))
            .map_err(|_| InteractionError::Channel("controller has shut down".into()))
    }

    /// # Errors
    ///
    /// Returns [`InteractionError::Channel`] once the controller has stopped.
    pub fn start_session(&self, language: Option<String>, greeting: Option<String>) -> Result<()> {
        self.send(SessionCommand::Start { language, greeting })
    }

    pub fn end_session(&self) -> Result<()> {
        self.send(SessionCommand::End)
    }

    pub fn interrupt(&self) -> Result<()> {
        self.send(SessionCommand::Interrupt)
    }

    pub fn activate(&self) -> Result<()> {
        self.send(SessionCommand::Activate)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(SessionCommand::Cancel)
    }

    pub fn rearm(&self) -> Result<()> {
        self.send(SessionCommand::Rearm)
    }

    /// A sink leaves can post events through.
    pub fn sink(&self) -> LeafEventSink {
        LeafEventSink::new(self.tx.clone())
    }

    /// The latest published state.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerSnapshot> {
        self.state_rx.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events_tx.subscribe()
    }

    /// Stop the controller task. The session, if any, is ended first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// Process inbox messages and timers until cancelled or every sender is gone.
pub async fn run_controller(
    mut controller: InteractionController,
    mut rx: mpsc::UnboundedReceiver<ControllerMessage>,
    cancel: CancellationToken,
) {
    info!("interaction controller running");
    loop {
        let deadline = controller.next_deadline();
        tokio::select! {
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => controller.handle(message, Instant::now()),
                None => {
                    debug!("controller inbox closed");
                    break;
                }
            },
            () = sleep_until(deadline) => controller.poll_timers(Instant::now()),
        }
    }
    controller.shutdown();
    info!("interaction controller stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
