//! Connectivity observer.
//!
//! The embedding application feeds OS reachability events into a
//! [`ConnectivityMonitor`]; the coordinator and the background scheduler
//! hold watch receivers. Reconnect triggering is edge-based and carries
//! no debounce: flapping wakes the scheduler repeatedly and the cycle
//! guard turns the extra wakes into no-ops.

use log::info;
use tokio::sync::watch;

use super::model::NetworkState;

/// Source of truth for device reachability.
pub struct ConnectivityMonitor {
    sender: watch::Sender<NetworkState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (sender, _) = watch::channel(initial);
        ConnectivityMonitor { sender }
    }

    /// Record a reachability change. Watchers observe the new value;
    /// same-state reports are dropped so they cannot wake anyone.
    pub fn set_state(&self, state: NetworkState) {
        let previous = *self.sender.borrow();
        if previous == state {
            return;
        }
        info!("[Sync] Network state {:?} -> {:?}", previous, state);
        self.sender.send_replace(state);
    }

    pub fn current(&self) -> NetworkState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkState::Offline)
    }
}
