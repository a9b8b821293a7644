use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::action::{
    ActionError, ActionPayload, ActionStatus, Operation, QueuedAction, TempId, UnixTimeMs,
};
use crate::breaker::{BreakerConfig, BreakerRegistry, ExecuteError};
use crate::network::NetworkMonitor;
use crate::remote::RemoteExecutor;
use crate::retry::RetryPolicy;
use crate::store::KeyValueStore;
use crate::{
    CONFIG_STORAGE_KEY, DEFAULT_DRAIN_INTERVAL_MS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRIES,
    QUEUE_STORAGE_KEY, SYNC_RESOURCE_NAME,
};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full ({0} entries, nothing evictable)")]
    Full(usize),

    #[error("action not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Runtime configuration. Mutable through the controller's `update_config`
/// and persisted alongside the queue snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub default_max_retries: u32,
    /// Circuit-breaker key for the remote this queue drains into.
    pub resource_name: String,
    pub retry: RetryPolicy,
    pub drain_interval_ms: u64,
    pub queue_key: String,
    pub config_key: String,
    pub breaker: BreakerConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            default_max_retries: DEFAULT_MAX_RETRIES,
            resource_name: SYNC_RESOURCE_NAME.to_string(),
            retry: RetryPolicy::default(),
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            queue_key: QUEUE_STORAGE_KEY.to_string(),
            config_key: CONFIG_STORAGE_KEY.to_string(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_queue_size == 0 {
            return Err(QueueError::InvalidConfig(
                "max_queue_size must be > 0".into(),
            ));
        }
        if self.default_max_retries == 0 {
            return Err(QueueError::InvalidConfig(
                "default_max_retries must be > 0".into(),
            ));
        }
        if self.drain_interval_ms == 0 {
            return Err(QueueError::InvalidConfig(
                "drain_interval_ms must be > 0".into(),
            ));
        }
        if self.resource_name.trim().is_empty() {
            return Err(QueueError::InvalidConfig(
                "resource_name cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Partial config update; unset fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub max_queue_size: Option<usize>,
    pub default_max_retries: Option<u32>,
    pub drain_interval_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub max_retries: Option<u32>,
}

/// Aggregate counts over the in-memory queue, computed on demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub oldest_timestamp: Option<UnixTimeMs>,
}

/// Combined point-in-time view of the queue: connectivity, whether a drain is
/// running, and the aggregate counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub stats: QueueStats,
}

/// One entry per action attempted during a drain cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptOutcome {
    pub action: QueuedAction,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    version: u32,
    actions: Vec<QueuedAction>,
    id_map: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct QueueState {
    actions: Vec<QueuedAction>,
    /// temp id → server-assigned id, kept until the snapshot is cleared.
    id_map: HashMap<String, String>,
}

type Listener = Box<dyn Fn(QueueStats) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// Handle returned by `subscribe`; dropping it (or calling `unsubscribe`)
/// deregisters the listener.
pub struct Subscription {
    id: u64,
    subscribers: Weak<StdMutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut guard) = subscribers.lock() {
                guard.listeners.remove(&self.id);
            }
        }
    }
}

/// Clears the drain guard even if a drain future is dropped mid-flight.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sort for a drain cycle: priority bands high→low, FIFO inside each band.
fn sort_for_drain(actions: &mut [QueuedAction]) {
    actions.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

/// Whether a dependent action may run, given the mapping table and the rest of
/// the queue. `Wait` enforces causal ordering between a Create and later
/// operations on the same not-yet-persisted resource; `Orphaned` means the
/// reference can never resolve.
#[derive(Debug, PartialEq, Eq)]
enum DependencyCheck {
    Ready,
    Wait,
    Orphaned,
}

fn check_dependency(action: &QueuedAction, state: &QueueState) -> DependencyCheck {
    let Some(reference) = action.payload.resource_ref() else {
        return DependencyCheck::Ready;
    };
    if !TempId::matches(reference) {
        return DependencyCheck::Ready;
    }
    if state.id_map.contains_key(reference) {
        return DependencyCheck::Ready;
    }

    let create_still_queued = state.actions.iter().any(|a| {
        !a.status.is_terminal()
            && matches!(&a.payload, ActionPayload::Create { temp_id, .. } if temp_id.as_str() == reference)
    });
    if create_still_queued {
        DependencyCheck::Wait
    } else {
        DependencyCheck::Orphaned
    }
}

/// Durable, prioritized, retryable queue of offline mutations. Single writer:
/// all mutation goes through these methods, so every persisted snapshot is
/// taken from a consistent in-memory state.
pub struct MutationQueue {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteExecutor>,
    network: Arc<dyn NetworkMonitor>,
    breakers: BreakerRegistry,
    config: RwLock<QueueConfig>,
    state: RwLock<QueueState>,
    syncing: AtomicBool,
    subscribers: Arc<StdMutex<Subscribers>>,
}

impl MutationQueue {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteExecutor>,
        network: Arc<dyn NetworkMonitor>,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let breakers = BreakerRegistry::new(config.breaker);
        Ok(Self {
            store,
            remote,
            network,
            breakers,
            config: RwLock::new(config),
            state: RwLock::new(QueueState::default()),
            syncing: AtomicBool::new(false),
            subscribers: Arc::new(StdMutex::new(Subscribers::default())),
        })
    }

    /// Restore the persisted snapshot. Corrupt or future-versioned snapshots
    /// are discarded with a warning; durability is best-effort and the
    /// in-memory queue is authoritative for the process lifetime.
    pub async fn load(&self) -> usize {
        let key = self.config.read().await.queue_key.clone();

        let raw = match self.store.get_item(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "failed to read queue snapshot, starting empty");
                return 0;
            }
        };

        let snapshot: QueueSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "corrupt queue snapshot, starting empty");
                return 0;
            }
        };
        if snapshot.version > SNAPSHOT_VERSION {
            warn!(
                found = snapshot.version,
                supported = SNAPSHOT_VERSION,
                "queue snapshot from a newer version, starting empty"
            );
            return 0;
        }

        let mut actions = snapshot.actions;
        for action in &mut actions {
            // The process died mid-drain; the attempt outcome is unknown, so
            // the action must be retried rather than stranded.
            if action.status == ActionStatus::Processing {
                action.status = ActionStatus::Pending;
            }
        }
        let count = actions.len();

        {
            let mut state = self.state.write().await;
            state.actions = actions;
            state.id_map = snapshot.id_map;
            self.notify(&state);
        }

        info!(count, "queue snapshot restored");
        count
    }

    /// Append a mutation. Enforces the capacity bound first, so the queue may
    /// shrink even though this is an "add".
    #[instrument(skip(self, payload, options), fields(resource_type = %resource_type.as_ref()))]
    pub async fn enqueue(
        &self,
        operation: Operation,
        resource_type: impl AsRef<str> + std::fmt::Debug,
        payload: ActionPayload,
        user_id: impl Into<String> + std::fmt::Debug,
        options: EnqueueOptions,
        now: UnixTimeMs,
    ) -> Result<QueuedAction, QueueError> {
        let config = self.config.read().await.clone();
        let max_retries = options.max_retries.unwrap_or(config.default_max_retries);

        let action = QueuedAction::new(
            operation,
            resource_type.as_ref(),
            payload,
            user_id,
            now,
            max_retries,
        )?;

        let mut state = self.state.write().await;

        let evicted = Self::evict_for_capacity(&mut state, config.max_queue_size);
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted queued actions at capacity");
        }
        if state.actions.len() >= config.max_queue_size {
            return Err(QueueError::Full(state.actions.len()));
        }

        state.actions.push(action.clone());
        debug!(action_id = %action.id.as_str(), operation = operation.as_str(), "action enqueued");

        self.persist(&state, &config.queue_key).await;
        self.notify(&state);

        Ok(action)
    }

    /// Make room for one more entry. Candidates are `Pending` actions, lowest
    /// priority and oldest first; retained `Failed` entries go next. Never
    /// `Processing`.
    fn evict_for_capacity(state: &mut QueueState, max: usize) -> Vec<QueuedAction> {
        let mut evicted = Vec::new();

        while state.actions.len() >= max {
            let candidate = state
                .actions
                .iter()
                .enumerate()
                .filter(|(_, a)| a.status == ActionStatus::Pending)
                .min_by(|(_, a), (_, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| a.timestamp.cmp(&b.timestamp))
                })
                .map(|(i, _)| i)
                .or_else(|| {
                    state
                        .actions
                        .iter()
                        .enumerate()
                        .filter(|(_, a)| a.status == ActionStatus::Failed)
                        .min_by_key(|(_, a)| a.timestamp)
                        .map(|(i, _)| i)
                });

            match candidate {
                Some(index) => evicted.push(state.actions.remove(index)),
                None => break,
            }
        }

        evicted
    }

    pub async fn remove_action(&self, id: &str) -> Result<QueuedAction, QueueError> {
        let config = self.config.read().await.clone();
        let mut state = self.state.write().await;

        let index = state
            .actions
            .iter()
            .position(|a| a.id.as_str() == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let removed = state.actions.remove(index);

        self.persist(&state, &config.queue_key).await;
        self.notify(&state);

        Ok(removed)
    }

    pub async fn clear(&self) {
        let config = self.config.read().await.clone();
        let mut state = self.state.write().await;

        state.actions.clear();
        state.id_map.clear();

        self.persist(&state, &config.queue_key).await;
        self.notify(&state);
    }

    pub async fn actions(&self) -> Vec<QueuedAction> {
        self.state.read().await.actions.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.actions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.actions.is_empty()
    }

    pub async fn stats(&self) -> QueueStats {
        Self::stats_of(&*self.state.read().await)
    }

    /// Whether a drain cycle is currently running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Single combined read for hosts rendering a sync indicator.
    pub async fn status(&self) -> QueueStatus {
        QueueStatus {
            is_online: self.network.fetch().await.is_online(),
            is_syncing: self.is_syncing(),
            stats: self.stats().await,
        }
    }

    pub async fn config(&self) -> QueueConfig {
        self.config.read().await.clone()
    }

    /// Apply a partial config update and persist the result. Rejected patches
    /// leave the running config untouched.
    pub async fn update_config(&self, patch: ConfigPatch) -> Result<QueueConfig, QueueError> {
        let mut config = self.config.write().await;
        let mut updated = config.clone();

        if let Some(max_queue_size) = patch.max_queue_size {
            updated.max_queue_size = max_queue_size;
        }
        if let Some(default_max_retries) = patch.default_max_retries {
            updated.default_max_retries = default_max_retries;
        }
        if let Some(drain_interval_ms) = patch.drain_interval_ms {
            updated.drain_interval_ms = drain_interval_ms;
        }
        if let Some(retry) = patch.retry {
            updated.retry = retry;
        }
        updated.validate()?;

        *config = updated.clone();
        drop(config);

        match serde_json::to_string(&updated) {
            Ok(raw) => {
                if let Err(e) = self.store.set_item(&updated.config_key, &raw).await {
                    warn!(error = %e, "failed to persist config");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize config"),
        }

        Ok(updated)
    }

    /// Restore a previously persisted config, if any. Corrupt or invalid
    /// payloads are ignored with a warning and the current config stands.
    pub async fn load_config(&self) -> QueueConfig {
        let config_key = self.config.read().await.config_key.clone();

        let raw = match self.store.get_item(&config_key).await {
            Ok(Some(raw)) => Some(raw),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read persisted config");
                None
            }
        };

        if let Some(raw) = raw {
            match serde_json::from_str::<QueueConfig>(&raw) {
                Ok(persisted) if persisted.validate().is_ok() => {
                    let mut config = self.config.write().await;
                    *config = persisted.clone();
                    return persisted;
                }
                Ok(_) => warn!("persisted config failed validation, keeping defaults"),
                Err(e) => warn!(error = %e, "corrupt persisted config, keeping defaults"),
            }
        }

        self.config.read().await.clone()
    }

    /// Register an observer. It is invoked synchronously with current stats
    /// right away, then again after every queue mutation. Listeners must not
    /// call back into the queue.
    pub async fn subscribe(
        &self,
        listener: impl Fn(QueueStats) + Send + Sync + 'static,
    ) -> Subscription {
        let stats = self.stats().await;
        listener(stats);

        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.listeners.insert(id, Box::new(listener));

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// One drain cycle: attempt every currently-eligible action, sequentially,
    /// highest priority first. Returns one outcome per attempted action.
    ///
    /// Reentrancy-guarded: a second call while a drain is running returns an
    /// empty result immediately. A drain while offline is a no-op.
    #[instrument(skip(self))]
    pub async fn process_queue(&self, now: UnixTimeMs) -> Vec<AttemptOutcome> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, skipping");
            return Vec::new();
        }
        let _guard = DrainGuard(&self.syncing);

        if !self.network.fetch().await.is_online() {
            debug!("offline, skipping drain");
            return Vec::new();
        }

        let config = self.config.read().await.clone();
        let breaker = self.breakers.instance(&config.resource_name).await;

        let mut outcomes = Vec::new();
        let mut attempted: HashSet<String> = HashSet::new();

        // Re-select after each batch: a completed Create can unblock dependent
        // actions within the same cycle. Each action is attempted at most once.
        loop {
            let batch = self.select_eligible(now, &attempted, &config).await;
            if batch.is_empty() {
                break;
            }

            for action_id in batch {
                attempted.insert(action_id.clone());

                let Some((operation_name, body)) = self.begin_attempt(&action_id).await else {
                    continue;
                };

                let result = breaker
                    .execute(self.remote.invoke(&operation_name, body))
                    .await;

                let outcome = self
                    .finish_attempt(&action_id, result, now, &config)
                    .await;
                if let Some(outcome) = outcome {
                    outcomes.push(outcome);
                }
            }
        }

        info!(
            attempted = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.success).count(),
            "drain cycle complete"
        );
        outcomes
    }

    /// Eligible = pending, past any backoff window, dependency-ready, and not
    /// yet attempted this cycle. Orphaned temp references are failed
    /// terminally here instead of burning remote attempts.
    async fn select_eligible(
        &self,
        now: UnixTimeMs,
        attempted: &HashSet<String>,
        config: &QueueConfig,
    ) -> Vec<String> {
        let mut state = self.state.write().await;

        let orphans: Vec<String> = state
            .actions
            .iter()
            .filter(|a| a.is_due(now) && check_dependency(a, &state) == DependencyCheck::Orphaned)
            .map(|a| a.id.as_str().to_string())
            .collect();
        if !orphans.is_empty() {
            for action in state.actions.iter_mut() {
                if orphans.iter().any(|id| id == action.id.as_str()) {
                    warn!(
                        action_id = %action.id.as_str(),
                        "temp-id reference has no pending create, failing permanently"
                    );
                    action.status = ActionStatus::Failed;
                    action.retry_count = action.max_retries;
                    action.last_error =
                        Some("referenced temp id has no pending create".to_string());
                }
            }
            self.persist(&state, &config.queue_key).await;
            self.notify(&state);
        }

        let mut eligible: Vec<QueuedAction> = state
            .actions
            .iter()
            .filter(|a| {
                a.is_due(now)
                    && !attempted.contains(a.id.as_str())
                    && check_dependency(a, &state) == DependencyCheck::Ready
            })
            .cloned()
            .collect();
        sort_for_drain(&mut eligible);

        eligible
            .into_iter()
            .map(|a| a.id.as_str().to_string())
            .collect()
    }

    /// Mark the action processing and build the remote invocation. Resolves a
    /// temp-id reference through the mapping table first, so the remote only
    /// ever sees server-assigned ids.
    async fn begin_attempt(&self, action_id: &str) -> Option<(String, serde_json::Value)> {
        let mut state = self.state.write().await;

        let resolved = {
            let state_ref = &*state;
            let action = state_ref
                .actions
                .iter()
                .find(|a| a.id.as_str() == action_id)?;
            action
                .payload
                .resource_ref()
                .and_then(|r| state_ref.id_map.get(r).cloned())
        };

        let action = state
            .actions
            .iter_mut()
            .find(|a| a.id.as_str() == action_id)?;
        if let Some(real_id) = resolved {
            action.payload.rewrite_resource_ref(&real_id);
        }
        action.status = ActionStatus::Processing;

        let operation_name = format!("{}.{}", action.resource_type, action.operation.as_str());
        let body = serde_json::json!({
            "action_id": action.id.as_str(),
            "user_id": action.user_id,
            "payload": action.payload,
        });
        Some((operation_name, body))
    }

    /// Apply an attempt result: remove on success (recording any new id
    /// mapping), or schedule a retry / mark terminal failure. Persists and
    /// notifies per action so observers see incremental progress.
    async fn finish_attempt(
        &self,
        action_id: &str,
        result: Result<crate::remote::RemoteResponse, ExecuteError<crate::remote::RemoteError>>,
        now: UnixTimeMs,
        config: &QueueConfig,
    ) -> Option<AttemptOutcome> {
        let mut state = self.state.write().await;

        let index = state
            .actions
            .iter()
            .position(|a| a.id.as_str() == action_id)?;

        let outcome = match result {
            Ok(response) => {
                let action = state.actions.remove(index);

                if let ActionPayload::Create { temp_id, .. } = &action.payload {
                    if let Some(server_id) = response.server_id() {
                        debug!(
                            temp_id = temp_id.as_str(),
                            server_id, "recorded temp-id mapping"
                        );
                        state
                            .id_map
                            .insert(temp_id.as_str().to_string(), server_id.to_string());
                        // Rewrite still-queued references so later attempts and
                        // the persisted snapshot carry the real id.
                        let real_id = server_id.to_string();
                        let temp = temp_id.as_str().to_string();
                        for queued in state.actions.iter_mut() {
                            if queued.payload.resource_ref() == Some(temp.as_str()) {
                                queued.payload.rewrite_resource_ref(&real_id);
                            }
                        }
                    }
                }

                AttemptOutcome {
                    action,
                    success: true,
                    error: None,
                }
            }
            Err(ExecuteError::Open { retry_after_ms }) => {
                // Not the remote's fault: the action keeps its retry budget
                // and stays immediately eligible once the breaker closes.
                let action = &mut state.actions[index];
                action.status = ActionStatus::Pending;
                let message = format!("circuit breaker open, retry in {retry_after_ms}ms");
                AttemptOutcome {
                    action: action.clone(),
                    success: false,
                    error: Some(message),
                }
            }
            Err(ExecuteError::Inner(remote_err)) => {
                let action = &mut state.actions[index];
                action.retry_count = if remote_err.is_retryable() {
                    (action.retry_count + 1).min(action.max_retries)
                } else {
                    // Malformed payloads can never succeed; spend the whole
                    // budget at once.
                    action.max_retries
                };
                action.last_error = Some(remote_err.to_string());

                if action.retries_exhausted() {
                    action.status = ActionStatus::Failed;
                    action.next_retry_at = None;
                    warn!(
                        action_id = %action.id.as_str(),
                        retries = action.retry_count,
                        "action failed permanently"
                    );
                } else {
                    action.status = ActionStatus::Pending;
                    action.next_retry_at =
                        Some(now.saturating_add(config.retry.delay_ms(action.retry_count)));
                }
                AttemptOutcome {
                    action: action.clone(),
                    success: false,
                    error: Some(remote_err.to_string()),
                }
            }
        };

        self.persist(&state, &config.queue_key).await;
        self.notify(&state);

        Some(outcome)
    }

    /// Snapshot the queue to the store. Failures are warnings: the in-memory
    /// queue stays authoritative and the next mutation retries the write.
    async fn persist(&self, state: &QueueState, queue_key: &str) {
        let snapshot = QueueSnapshot {
            version: SNAPSHOT_VERSION,
            actions: state.actions.clone(),
            id_map: state.id_map.clone(),
        };
        let raw = match serde_json::to_string(&snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize queue snapshot");
                return;
            }
        };
        if let Err(e) = self.store.set_item(queue_key, &raw).await {
            warn!(error = %e, "failed to persist queue snapshot");
        }
    }

    fn stats_of(state: &QueueState) -> QueueStats {
        let mut stats = QueueStats {
            total: state.actions.len(),
            ..QueueStats::default()
        };
        for action in &state.actions {
            match action.status {
                ActionStatus::Pending => stats.pending += 1,
                ActionStatus::Processing => stats.processing += 1,
                ActionStatus::Failed => stats.failed += 1,
            }
            stats.oldest_timestamp = Some(match stats.oldest_timestamp {
                Some(oldest) if oldest <= action.timestamp => oldest,
                _ => action.timestamp,
            });
        }
        stats
    }

    fn notify(&self, state: &QueueState) {
        let stats = Self::stats_of(state);
        let subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in subscribers.listeners.values() {
            listener(stats);
        }
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("syncing", &self.syncing.load(Ordering::Relaxed))
            .finish()
    }
}
