use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Circuit breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, all calls pass through.
    Closed,
    /// Failing fast, calls are rejected before reaching the remote.
    Open,
    /// Testing recovery, one probe call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A call rejected or failed through the breaker. `Open` is infrastructure
/// weather, distinct from the wrapped remote error: callers must not charge
/// it against an action's retry budget.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError<E> {
    #[error("circuit breaker open, retry in {retry_after_ms}ms")]
    Open { retry_after_ms: u64 },

    #[error("{0}")]
    Inner(E),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe.
    pub cooldown_ms: u64,
    /// Cooldown cap; each failed probe doubles the cooldown up to this.
    pub max_cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            max_cooldown_ms: 300_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: Option<CircuitState>,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub times_opened: u64,
}

/// Per-resource failure tracker. Lock-free reads; state is derived from the
/// consecutive-failure count and the open-until deadline.
pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Monotonic milliseconds when the open window ends (0 = not open).
    open_until_ms: AtomicU64,
    /// Current cooldown, doubled after each failed probe.
    cooldown_ms: AtomicU64,
    /// Gates the single half-open probe.
    probe_in_flight: AtomicBool,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
    times_opened: AtomicU64,
    config: BreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_ms: AtomicU64::new(0),
            cooldown_ms: AtomicU64::new(config.cooldown_ms),
            probe_in_flight: AtomicBool::new(false),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            times_opened: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        if open_until > 0 && self.now_ms() < open_until {
            return CircuitState::Open;
        }
        if self.failures.load(Ordering::Acquire) >= self.config.failure_threshold {
            return CircuitState::HalfOpen;
        }
        CircuitState::Closed
    }

    #[must_use]
    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: Some(self.state()),
            consecutive_failures: self.failures.load(Ordering::Acquire),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds until the open window ends. 0 when not open.
    #[must_use]
    pub fn remaining_open_ms(&self) -> u64 {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        let now = self.now_ms();
        if open_until > now {
            open_until - now
        } else {
            0
        }
    }

    /// Force the breaker back to `Closed`.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        self.open_until_ms.store(0, Ordering::Release);
        self.cooldown_ms
            .store(self.config.cooldown_ms, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
    }

    /// Run `fut` through the breaker: rejected immediately when open, gated to
    /// a single caller when half-open, success/failure recorded otherwise.
    pub async fn execute<T, E, F>(&self, fut: F) -> Result<T, ExecuteError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match self.state() {
            CircuitState::Open => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                return Err(ExecuteError::Open {
                    retry_after_ms: self.remaining_open_ms(),
                });
            }
            CircuitState::HalfOpen => {
                // Only one probe may be in flight; everyone else fails fast.
                if self.probe_in_flight.swap(true, Ordering::AcqRel) {
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    return Err(ExecuteError::Open {
                        retry_after_ms: self.cooldown_ms.load(Ordering::Acquire),
                    });
                }
            }
            CircuitState::Closed => {}
        }

        // The probe gate is released inside record_success/record_failure,
        // after the new state is published, so no second probe can slip
        // through a still-HalfOpen window.
        match fut.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(ExecuteError::Inner(e))
            }
        }
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.failures.store(0, Ordering::Release);
        self.open_until_ms.store(0, Ordering::Release);
        self.cooldown_ms
            .store(self.config.cooldown_ms, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let new_count = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if new_count >= self.config.failure_threshold {
            let cooldown = self.cooldown_ms.load(Ordering::Acquire);
            self.open_until_ms
                .store(self.now_ms().saturating_add(cooldown), Ordering::Release);
            // Next open window is longer, capped.
            let next = cooldown
                .saturating_mul(2)
                .min(self.config.max_cooldown_ms);
            self.cooldown_ms.store(next, Ordering::Release);
            self.times_opened.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = new_count,
                cooldown_ms = cooldown,
                "circuit breaker opened"
            );
        }
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

/// One breaker per logical resource name, lazily created, so independent
/// remotes never share failure state.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn instance(&self, resource_name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(resource_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().await;
        let breaker = breakers
            .entry(resource_name.to_string())
            .or_insert_with(|| {
                debug!(resource = resource_name, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(self.config))
            });
        Arc::clone(breaker)
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
