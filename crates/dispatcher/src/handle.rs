//! DispatcherHandle - cheap, cloneable sender side of the dispatcher mailbox
//!
//! Every method is non-blocking and may be called from any thread, async or
//! not. Once the dispatcher has stopped, messages are silently discarded.

use contracts::{NetworkInfo, Tag};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::trace;

use crate::action::{Action, ActionRef};
use crate::dispatcher::{Command, DispatcherSnapshot};
use crate::error::DispatcherError;

#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: UnboundedSender<Command>,
}

impl DispatcherHandle {
    pub fn new(tx: UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.tx.send(command) {
            trace!(command = ?e.0, "Dispatcher stopped, command dropped");
        }
    }

    pub fn submit(&self, action: Action) {
        self.send(Command::Submit(action));
    }

    pub fn cancel(&self, action_ref: ActionRef) {
        self.send(Command::Cancel(action_ref));
    }

    pub fn pause_tag(&self, tag: Tag) {
        self.send(Command::PauseTag(tag));
    }

    pub fn resume_tag(&self, tag: Tag) {
        self.send(Command::ResumeTag(tag));
    }

    pub fn network_state_changed(&self, info: Option<NetworkInfo>) {
        self.send(Command::NetworkStateChange(info));
    }

    pub fn airplane_mode_changed(&self, enabled: bool) {
        self.send(Command::AirplaneModeChange(enabled));
    }

    /// Whether the dispatcher task is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Ask the dispatcher for a snapshot of its state
    ///
    /// # Errors
    /// [`DispatcherError::Closed`] when the dispatcher task has stopped.
    pub async fn snapshot(&self) -> Result<DispatcherSnapshot, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply))
            .map_err(|_| DispatcherError::Closed)?;
        rx.await.map_err(|_| DispatcherError::Closed)
    }

    /// Shut the dispatcher down and wait until it has released its
    /// collaborators. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(Some(ack))).is_ok() {
            let _ = rx.await;
        }
    }

    /// Request shutdown without waiting
    pub fn shutdown_now(&self) {
        self.send(Command::Shutdown(None));
    }
}
