//! Circuit breaker for the coaching collaborators.
//!
//! A collaborator that keeps failing (quota exhausted, network down) is
//! skipped for a cooldown instead of being called on every nudge, so the
//! local fallback is used immediately. After the cooldown one trial call is
//! let through; its outcome closes or re-opens the circuit.
//!
//! # Example
//! ```rust
//! use focusflow_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use focusflow_core::timing::ManualClock;
//! use std::sync::Arc;
//!
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), Arc::new(ManualClock::new(0)));
//!
//! fn synthesize() -> Result<(), ()> { Ok(()) }
//!
//! if !breaker.is_open("speech") {
//!     match synthesize() {
//!         Ok(_) => breaker.record_success("speech"),
//!         Err(_) => breaker.record_failure("speech"),
//!     }
//! }
//! ```

use crate::config::ServicesConfig;
use crate::timing::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Circuit State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy. Calls flow through.
    Closed { failures: u32 },
    /// Tripped. Calls are skipped until the cooldown elapses.
    Open { opened_at_ms: i64 },
    /// Cooldown elapsed; `trial_permits` calls may go through. A trial that
    /// never settles is re-granted one cooldown after `since_ms`.
    HalfOpen { trial_permits: u32, since_ms: i64 },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening (default: 3)
    pub failure_threshold: u32,
    /// Time spent open before a trial call (default: 30s)
    pub open_cooldown_ms: i64,
    /// Trial calls allowed while half-open (default: 1)
    pub half_open_trial: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_cooldown_ms: 30_000,
            half_open_trial: 1,
        }
    }
}

impl From<&ServicesConfig> for CircuitBreakerConfig {
    fn from(config: &ServicesConfig) -> Self {
        Self {
            failure_threshold: config.breaker_failure_threshold.max(1),
            open_cooldown_ms: config.breaker_open_cooldown_ms,
            ..Default::default()
        }
    }
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Per-service circuit states, shared between the orchestrator and its
/// delivery tasks.
pub struct CircuitBreaker {
    states: Mutex<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CircuitBreaker")
            .field("total_circuits", &stats.total_circuits)
            .field("open", &stats.open)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Returns `true` if calls to `service` should be skipped right now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// consumes one trial permit for this call.
    pub fn is_open(&self, service: &str) -> bool {
        let now = self.clock.now_ms();
        let mut states = self.states.lock();
        let state = states
            .entry(service.to_string())
            .or_insert(CircuitState::Closed { failures: 0 });

        match *state {
            CircuitState::Closed { .. } => false,
            CircuitState::Open { opened_at_ms } => {
                if now - opened_at_ms >= self.config.open_cooldown_ms {
                    log::debug!("Circuit cooldown elapsed for '{}', entering half-open", service);
                    *state = CircuitState::HalfOpen {
                        trial_permits: self.config.half_open_trial.saturating_sub(1),
                        since_ms: now,
                    };
                    false
                } else {
                    true
                }
            }
            CircuitState::HalfOpen {
                trial_permits,
                since_ms,
            } => {
                if trial_permits > 0 {
                    *state = CircuitState::HalfOpen {
                        trial_permits: trial_permits - 1,
                        since_ms,
                    };
                    false
                } else if now - since_ms >= self.config.open_cooldown_ms {
                    log::debug!("Half-open trial for '{}' never settled, granting another", service);
                    *state = CircuitState::HalfOpen {
                        trial_permits: self.config.half_open_trial.saturating_sub(1),
                        since_ms: now,
                    };
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Hand back a trial permit taken by [`is_open`](Self::is_open) when the
    /// call ended without a success or failure worth counting (cancelled, or
    /// a non-transient error). No-op unless half-open.
    pub fn release_trial(&self, service: &str) {
        let mut states = self.states.lock();
        if let Some(CircuitState::HalfOpen { trial_permits, .. }) = states.get_mut(service) {
            *trial_permits = (*trial_permits + 1).min(self.config.half_open_trial);
        }
    }

    pub fn record_success(&self, service: &str) {
        let mut states = self.states.lock();
        let previous = states.insert(service.to_string(), CircuitState::Closed { failures: 0 });
        if !matches!(previous, None | Some(CircuitState::Closed { .. })) {
            log::info!("Circuit closed for '{}'", service);
        }
    }

    pub fn record_failure(&self, service: &str) {
        let now = self.clock.now_ms();
        let mut states = self.states.lock();

        let failures = match states.get(service) {
            Some(CircuitState::Closed { failures }) => failures + 1,
            Some(CircuitState::HalfOpen { .. }) => {
                log::warn!("Circuit re-opened for '{}' after half-open failure", service);
                states.insert(service.to_string(), CircuitState::Open { opened_at_ms: now });
                return;
            }
            Some(CircuitState::Open { .. }) => return,
            None => 1,
        };

        let next = if failures >= self.config.failure_threshold {
            log::warn!("Circuit opened for '{}' after {} failures", service, failures);
            CircuitState::Open { opened_at_ms: now }
        } else {
            log::debug!(
                "Circuit failure {}/{} for '{}'",
                failures,
                self.config.failure_threshold,
                service
            );
            CircuitState::Closed { failures }
        };
        states.insert(service.to_string(), next);
    }

    pub fn state(&self, service: &str) -> Option<CircuitState> {
        self.states.lock().get(service).copied()
    }

    pub fn stats(&self) -> CircuitStats {
        let states = self.states.lock();
        let mut stats = CircuitStats {
            total_circuits: states.len(),
            ..Default::default()
        };
        for state in states.values() {
            match state {
                CircuitState::Closed { .. } => stats.closed += 1,
                CircuitState::Open { .. } => stats.open += 1,
                CircuitState::HalfOpen { .. } => stats.half_open += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitStats {
    pub total_circuits: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

// ============================================================================
// Tests
// ============================================================================
