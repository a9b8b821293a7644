use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Point-in-time connectivity report from the platform shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub is_internet_reachable: bool,
}

impl NetworkStatus {
    pub const ONLINE: Self = Self {
        is_connected: true,
        is_internet_reachable: true,
    };

    pub const OFFLINE: Self = Self {
        is_connected: false,
        is_internet_reachable: false,
    };

    /// Draining requires actual reachability, not just a link-up interface.
    #[must_use]
    pub const fn is_online(self) -> bool {
        self.is_connected && self.is_internet_reachable
    }
}

/// Connectivity source. `fetch` is the point-in-time check consulted before a
/// drain; `subscribe` yields a receiver that observes every transition.
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn fetch(&self) -> NetworkStatus;
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;
}

/// Monitor fed by the host shell pushing transitions into a watch channel.
#[derive(Debug)]
pub struct ChannelNetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl ChannelNetworkMonitor {
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set_status(&self, status: NetworkStatus) {
        // send_replace never fails; the sender keeps the channel alive.
        self.tx.send_replace(status);
    }
}

impl Default for ChannelNetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::OFFLINE)
    }
}

#[async_trait::async_trait]
impl NetworkMonitor for ChannelNetworkMonitor {
    async fn fetch(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}
