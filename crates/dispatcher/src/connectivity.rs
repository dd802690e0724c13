//! ConnectivityMonitor - turns platform broadcasts into dispatcher messages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::NetworkInfo;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::handle::DispatcherHandle;

/// A platform broadcast
///
/// Payloads are optional because the platform may omit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Active network changed; `None` means no active network
    Connectivity(Option<NetworkInfo>),
    /// Airplane mode toggled; `None` when the state extra is missing
    AirplaneMode(Option<bool>),
}

/// Receiver of connectivity broadcasts
///
/// Safe to call from any thread. The dispatcher clears the registration flag
/// when it shuts down; after that every broadcast is ignored.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    handle: DispatcherHandle,
    registered: Arc<AtomicBool>,
}

impl ConnectivityMonitor {
    pub fn new(handle: DispatcherHandle, registered: Arc<AtomicBool>) -> Self {
        Self { handle, registered }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Handle one broadcast; a missing broadcast is ignored
    pub fn on_broadcast(&self, broadcast: Option<Broadcast>) {
        if !self.is_registered() {
            trace!(?broadcast, "Monitor unregistered, broadcast ignored");
            return;
        }
        match broadcast {
            None | Some(Broadcast::AirplaneMode(None)) => {
                trace!("Incomplete broadcast ignored");
            }
            Some(Broadcast::AirplaneMode(Some(enabled))) => {
                self.handle.airplane_mode_changed(enabled);
            }
            Some(Broadcast::Connectivity(info)) => {
                self.handle.network_state_changed(info);
            }
        }
    }

    /// Feed every broadcast from `rx` until the channel closes
    pub fn forward(&self, rx: mpsc::Receiver<Broadcast>) -> JoinHandle<()> {
        tokio::spawn(forward_loop(self.clone(), rx))
    }
}

#[instrument(name = "connectivity_forward", skip_all)]
async fn forward_loop(monitor: ConnectivityMonitor, mut rx: mpsc::Receiver<Broadcast>) {
    debug!("Forwarding connectivity broadcasts");
    while let Some(broadcast) = rx.recv().await {
        monitor.on_broadcast(Some(broadcast));
    }
    debug!("Broadcast stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Command;

    fn monitor(registered: bool) -> (ConnectivityMonitor, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = ConnectivityMonitor::new(
            DispatcherHandle::new(tx),
            Arc::new(AtomicBool::new(registered)),
        );
        (monitor, rx)
    }

    #[test]
    fn test_broadcasts_translate_to_commands() {
        let (monitor, mut rx) = monitor(true);
        monitor.on_broadcast(Some(Broadcast::Connectivity(Some(NetworkInfo::wifi()))));
        monitor.on_broadcast(Some(Broadcast::AirplaneMode(Some(true))));
        monitor.on_broadcast(Some(Broadcast::Connectivity(None)));

        assert!(matches!(
            rx.try_recv(),
            Ok(Command::NetworkStateChange(Some(info))) if info == NetworkInfo::wifi()
        ));
        assert!(matches!(rx.try_recv(), Ok(Command::AirplaneModeChange(true))));
        assert!(matches!(rx.try_recv(), Ok(Command::NetworkStateChange(None))));
    }

    #[test]
    fn test_missing_payloads_ignored() {
        let (monitor, mut rx) = monitor(true);
        monitor.on_broadcast(None);
        monitor.on_broadcast(Some(Broadcast::AirplaneMode(None)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_monitor_ignores_everything() {
        let (monitor, mut rx) = monitor(false);
        monitor.on_broadcast(Some(Broadcast::AirplaneMode(Some(true))));
        assert!(!monitor.is_registered());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forward_stream() {
        let (monitor, mut rx) = monitor(true);
        let (tx, broadcasts) = mpsc::channel(4);
        let task = monitor.forward(broadcasts);

        tx.send(Broadcast::AirplaneMode(Some(false))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(matches!(rx.recv().await, Some(Command::AirplaneModeChange(false))));
    }
}
