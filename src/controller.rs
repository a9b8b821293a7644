use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::action::{ActionPayload, Operation, QueuedAction, UnixTimeMs};
use crate::network::NetworkMonitor;
use crate::queue::{
    AttemptOutcome, ConfigPatch, EnqueueOptions, MutationQueue, QueueConfig, QueueError,
    QueueStats, QueueStatus, Subscription,
};

/// Facade over the mutation queue: restores persisted state on start, then
/// keeps the queue draining in the background on connectivity regain and on a
/// periodic timer. Stopping tears the background tasks down without touching
/// queued actions.
pub struct SyncController {
    queue: Arc<MutationQueue>,
    network: Arc<dyn NetworkMonitor>,
    running: AtomicBool,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SyncController {
    #[must_use]
    pub fn new(queue: Arc<MutationQueue>, network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            queue,
            network,
            running: AtomicBool::new(false),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Restore persisted config and queue state, drain immediately if online,
    /// and spawn the connectivity and timer drain loops. Idempotent.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("controller already running");
            return;
        }

        let config = self.queue.load_config().await;
        self.queue.load().await;

        if self.network.fetch().await.is_online() {
            self.queue.process_queue(UnixTimeMs::now()).await;
        }

        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push(tokio::spawn(Self::watch_connectivity(
            Arc::clone(&self.queue),
            self.network.subscribe(),
        )));
        tasks.push(tokio::spawn(Self::drain_periodically(Arc::clone(
            &self.queue,
        ))));

        info!(
            drain_interval_ms = config.drain_interval_ms,
            "sync controller started"
        );
    }

    /// Stop background draining. Queued actions stay in memory and in the
    /// persisted snapshot.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("sync controller stopped");
    }

    async fn watch_connectivity(
        queue: Arc<MutationQueue>,
        mut rx: tokio::sync::watch::Receiver<crate::network::NetworkStatus>,
    ) {
        let mut was_online = rx.borrow().is_online();
        while rx.changed().await.is_ok() {
            let is_online = rx.borrow().is_online();
            if !was_online && is_online {
                info!("connectivity regained, draining queue");
                queue.process_queue(UnixTimeMs::now()).await;
            }
            was_online = is_online;
        }
    }

    /// The interval is re-read from the queue config before each tick, so an
    /// `update_config` change takes effect from the next tick onward.
    async fn drain_periodically(queue: Arc<MutationQueue>) {
        loop {
            let interval_ms = queue.config().await.drain_interval_ms;
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            queue.process_queue(UnixTimeMs::now()).await;
        }
    }

    pub async fn enqueue(
        &self,
        operation: Operation,
        resource_type: impl AsRef<str> + std::fmt::Debug,
        payload: ActionPayload,
        user_id: impl Into<String> + std::fmt::Debug,
        options: EnqueueOptions,
    ) -> Result<QueuedAction, QueueError> {
        self.queue
            .enqueue(
                operation,
                resource_type,
                payload,
                user_id,
                options,
                UnixTimeMs::now(),
            )
            .await
    }

    /// Trigger a drain cycle outside the background schedule.
    pub async fn drain_now(&self) -> Vec<AttemptOutcome> {
        self.queue.process_queue(UnixTimeMs::now()).await
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    pub async fn status(&self) -> QueueStatus {
        self.queue.status().await
    }

    pub async fn subscribe(
        &self,
        listener: impl Fn(QueueStats) + Send + Sync + 'static,
    ) -> Subscription {
        self.queue.subscribe(listener).await
    }

    pub async fn update_config(&self, patch: ConfigPatch) -> Result<QueueConfig, QueueError> {
        self.queue.update_config(patch).await
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TempId;
    use crate::network::{ChannelNetworkMonitor, NetworkStatus};
    use crate::remote::{RemoteError, RemoteExecutor, RemoteResponse};
    use crate::store::{KeyValueStore, MemoryStore};
    use std::sync::atomic::AtomicUsize;

    struct CountingRemote {
        calls: AtomicUsize,
    }

    impl CountingRemote {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteExecutor for CountingRemote {
        async fn invoke(
            &self,
            _operation: &str,
            _body: serde_json::Value,
        ) -> Result<RemoteResponse, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteResponse {
                data: serde_json::json!({}),
            })
        }
    }

    struct Harness {
        controller: SyncController,
        network: Arc<ChannelNetworkMonitor>,
        store: Arc<MemoryStore>,
        remote: Arc<CountingRemote>,
    }

    fn harness(online: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(CountingRemote::new());
        let network = Arc::new(ChannelNetworkMonitor::new(if online {
            NetworkStatus::ONLINE
        } else {
            NetworkStatus::OFFLINE
        }));
        let queue = Arc::new(
            MutationQueue::new(
                Arc::clone(&store) as Arc<dyn KeyValueStore>,
                Arc::clone(&remote) as Arc<dyn RemoteExecutor>,
                Arc::clone(&network) as Arc<dyn NetworkMonitor>,
                QueueConfig::default(),
            )
            .unwrap(),
        );
        Harness {
            controller: SyncController::new(queue, Arc::clone(&network) as Arc<dyn NetworkMonitor>),
            network,
            store,
            remote,
        }
    }

    fn create_payload() -> ActionPayload {
        ActionPayload::Create {
            temp_id: TempId::generate(),
            data: serde_json::json!({"title": "A"}),
        }
    }

    async fn wait_until_empty(controller: &SyncController) {
        for _ in 0..100 {
            if controller.queue().is_empty().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never drained");
    }

    #[tokio::test]
    async fn start_drains_immediately_when_online() {
        let h = harness(true);
        h.controller
            .enqueue(
                Operation::Create,
                "assignment",
                create_payload(),
                "user-1",
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        h.controller.start().await;

        assert!(h.controller.is_running());
        assert!(h.controller.queue().is_empty().await);
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let h = harness(false);
        h.controller.start().await;
        h.controller.start().await;

        let tasks = h.controller.tasks.lock().unwrap().len();
        assert_eq!(tasks, 2);
    }

    #[tokio::test]
    async fn connectivity_regain_triggers_drain() {
        let h = harness(false);
        h.controller.start().await;

        h.controller
            .enqueue(
                Operation::Create,
                "assignment",
                create_payload(),
                "user-1",
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(h.controller.stats().await.total, 1);

        h.network.set_status(NetworkStatus::ONLINE);
        wait_until_empty(&h.controller).await;
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_drains() {
        let h = harness(true);
        h.controller.start().await;

        h.controller
            .enqueue(
                Operation::Create,
                "assignment",
                create_payload(),
                "user-1",
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        // Paused clock: sleeping past the drain interval fires the timer.
        tokio::time::sleep(Duration::from_millis(
            crate::DEFAULT_DRAIN_INTERVAL_MS + 1_000,
        ))
        .await;
        wait_until_empty(&h.controller).await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_picks_up_updated_drain_interval() {
        let h = harness(true);
        h.controller.start().await;

        h.controller
            .update_config(ConfigPatch {
                drain_interval_ms: Some(5_000),
                ..ConfigPatch::default()
            })
            .await
            .unwrap();

        // The in-flight sleep was armed with the old interval; let it lapse.
        tokio::time::sleep(Duration::from_millis(
            crate::DEFAULT_DRAIN_INTERVAL_MS + 1_000,
        ))
        .await;

        h.controller
            .enqueue(
                Operation::Create,
                "assignment",
                create_payload(),
                "user-1",
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        // The next tick must use the shortened interval: 6s is far under the
        // default 30s but past the updated 5s.
        tokio::time::sleep(Duration::from_millis(6_000)).await;
        wait_until_empty(&h.controller).await;
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_preserves_queue() {
        let h = harness(false);
        h.controller.start().await;

        h.controller
            .enqueue(
                Operation::Create,
                "assignment",
                create_payload(),
                "user-1",
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        h.controller.stop();
        assert!(!h.controller.is_running());

        // Transitions after stop no longer drain.
        h.network.set_status(NetworkStatus::ONLINE);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.controller.stats().await.total, 1);
        assert_eq!(h.remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_restores_persisted_config() {
        let h = harness(false);
        h.controller
            .update_config(ConfigPatch {
                max_queue_size: Some(7),
                ..ConfigPatch::default()
            })
            .await
            .unwrap();

        // A fresh controller over the same store picks the config back up.
        let remote = Arc::new(CountingRemote::new());
        let queue = Arc::new(
            MutationQueue::new(
                Arc::clone(&h.store) as Arc<dyn KeyValueStore>,
                remote as Arc<dyn RemoteExecutor>,
                Arc::clone(&h.network) as Arc<dyn NetworkMonitor>,
                QueueConfig::default(),
            )
            .unwrap(),
        );
        let controller = SyncController::new(
            queue,
            Arc::clone(&h.network) as Arc<dyn NetworkMonitor>,
        );
        controller.start().await;

        assert_eq!(controller.queue().config().await.max_queue_size, 7);
    }
}
