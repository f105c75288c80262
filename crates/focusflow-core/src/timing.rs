//! Timing primitives: injectable clocks and cancelable interval timers.
//!
//! Every component in the crate reads time as `i64` milliseconds handed in by
//! the host, which in turn reads it from a [`Clock`]. Tests drive a
//! [`ManualClock`] so that evaluation ticks, warm-up windows and cooldowns can
//! be stepped deterministically.
//!
//! # Invariants
//! - An [`IntervalTimer`] fires at most once per `poll`.
//! - Missed periods are skipped, never replayed in a burst.
//! - A cancelled timer never fires until it is started again.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Virtual clock advanced explicitly by the caller.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Move time forward by `delta_ms` and return the new time.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms.max(0), Ordering::SeqCst) + delta_ms.max(0)
    }

    /// Jump to an absolute time. Going backwards is ignored.
    pub fn set(&self, now_ms: i64) {
        self.now.fetch_max(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Repeating, cancelable, restartable interval polled against a clock.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period_ms: i64,
    next_due_ms: Option<i64>,
}

impl IntervalTimer {
    /// Create a stopped timer. Non-positive periods are raised to 1 ms.
    pub fn new(period_ms: i64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due_ms: None,
        }
    }

    /// Start (or restart) so the first firing happens one period after `now_ms`.
    pub fn start(&mut self, now_ms: i64) {
        self.next_due_ms = Some(now_ms + self.period_ms);
    }

    pub fn cancel(&mut self) {
        self.next_due_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Change the period; a running timer is rescheduled from `now_ms`.
    pub fn set_period(&mut self, period_ms: i64, now_ms: i64) {
        self.period_ms = period_ms.max(1);
        if self.is_running() {
            self.start(now_ms);
        }
    }

    /// Returns `true` when the timer is due at `now_ms` and schedules the next firing.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        let Some(due) = self.next_due_ms else {
            return false;
        };
        if now_ms < due {
            return false;
        }
        // Lagging by more than a full period: skip the missed firings.
        let next = if now_ms - due >= self.period_ms {
            now_ms + self.period_ms
        } else {
            due + self.period_ms
        };
        self.next_due_ms = Some(next);
        true
    }
}
