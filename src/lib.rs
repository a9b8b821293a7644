// lib.rs - offline mutation queue core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod action;
pub mod breaker;
pub mod controller;
pub mod network;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod store;

pub use action::{
    ActionError, ActionId, ActionPayload, ActionStatus, Operation, Priority, QueuedAction, TempId,
    UnixTimeMs,
};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerStats, CircuitBreaker, CircuitState};
pub use controller::SyncController;
pub use network::{ChannelNetworkMonitor, NetworkMonitor, NetworkStatus};
pub use queue::{
    AttemptOutcome, ConfigPatch, EnqueueOptions, MutationQueue, QueueConfig, QueueError,
    QueueStats, QueueStatus, Subscription,
};
pub use remote::{RemoteError, RemoteExecutor, RemoteResponse};
pub use retry::RetryPolicy;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const BASE_RETRY_DELAY_MS: u64 = 1000;
pub const MAX_RETRY_DELAY_MS: u64 = 60000;
pub const JITTER_MAX_MS: u64 = 1000;
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 30_000;
pub const SYNC_RESOURCE_NAME: &str = "sync-manager";
pub const QUEUE_STORAGE_KEY: &str = "studysync:queue";
pub const CONFIG_STORAGE_KEY: &str = "studysync:config";
