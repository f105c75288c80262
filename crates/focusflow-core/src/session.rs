//! Session lifecycle: idle → running ⇄ paused → ended.
//!
//! The recorder takes a score snapshot every [`SNAPSHOT_INTERVAL_MS`] while
//! running and counts distraction episodes. Transitions that do not apply to
//! the current phase are ignored and reported as `false`.

use crate::accumulator::ScoreSample;
use crate::summary::{SessionSummary, FOCUSED_SCORE, SNAPSHOT_INTERVAL_MS};
use crate::timing::IntervalTimer;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// Running or paused.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub start_time: Option<i64>,
    pub paused_at: Option<i64>,
    pub total_paused_ms: i64,
    pub snapshots: Vec<ScoreSample>,
    pub distraction_count: u32,
    /// One snapshot interval per snapshot at or above the focused score
    pub focused_ms: i64,
}

#[derive(Debug, Clone)]
pub struct SessionRecorder {
    state: SessionState,
    snapshot_timer: IntervalTimer,
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self {
            state: SessionState::default(),
            snapshot_timer: IntervalTimer::new(SNAPSHOT_INTERVAL_MS),
        }
    }

    /// Begin a fresh session from any phase; previous data is discarded.
    pub fn start(&mut self, now_ms: i64) {
        self.state = SessionState {
            phase: SessionPhase::Running,
            start_time: Some(now_ms),
            ..Default::default()
        };
        self.snapshot_timer.start(now_ms);
        log::info!("Session started");
    }

    pub fn pause(&mut self, now_ms: i64) -> bool {
        if self.state.phase != SessionPhase::Running {
            return false;
        }
        self.state.phase = SessionPhase::Paused;
        self.state.paused_at = Some(now_ms);
        self.snapshot_timer.cancel();
        log::info!("Session paused");
        true
    }

    pub fn resume(&mut self, now_ms: i64) -> bool {
        if self.state.phase != SessionPhase::Paused {
            return false;
        }
        let paused_at = self.state.paused_at.take().unwrap_or(now_ms);
        self.state.total_paused_ms += (now_ms - paused_at).max(0);
        self.state.phase = SessionPhase::Running;
        self.snapshot_timer.start(now_ms);
        log::info!("Session resumed");
        true
    }

    /// End a running or paused session and summarize it. A pause still open
    /// at the end is added to the paused total.
    pub fn end(&mut self, now_ms: i64) -> Option<SessionSummary> {
        if !self.state.phase.is_live() {
            return None;
        }
        if let Some(paused_at) = self.state.paused_at.take() {
            self.state.total_paused_ms += (now_ms - paused_at).max(0);
        }
        self.state.phase = SessionPhase::Ended;
        self.snapshot_timer.cancel();

        let summary = SessionSummary::compute(&self.state, now_ms);
        log::info!(
            "Session ended: {}s active, average {}, {} distractions",
            summary.total_duration_ms / 1_000,
            summary.average_score,
            summary.distraction_count
        );
        Some(summary)
    }

    /// Record one snapshot. Ignored unless running.
    pub fn record_snapshot(&mut self, score: u8, now_ms: i64) -> bool {
        if self.state.phase != SessionPhase::Running {
            return false;
        }
        self.state.snapshots.push(ScoreSample {
            time_ms: now_ms,
            score,
        });
        if score >= FOCUSED_SCORE {
            self.state.focused_ms += SNAPSHOT_INTERVAL_MS;
        }
        true
    }

    /// Take a snapshot when the snapshot interval is due.
    pub fn poll(&mut self, score: u8, now_ms: i64) -> bool {
        self.snapshot_timer.poll(now_ms) && self.record_snapshot(score, now_ms)
    }

    pub fn record_distraction(&mut self) -> bool {
        if self.state.phase != SessionPhase::Running {
            return false;
        }
        self.state.distraction_count += 1;
        true
    }

    /// Back to idle.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
        self.snapshot_timer.cancel();
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Active (unpaused) time so far.
    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        let Some(start) = self.state.start_time else {
            return 0;
        };
        let open_pause = self
            .state
            .paused_at
            .map(|p| (now_ms - p).max(0))
            .unwrap_or(0);
        (now_ms - start - self.state.total_paused_ms - open_pause).max(0)
    }
}
