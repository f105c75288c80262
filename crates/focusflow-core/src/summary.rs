//! End-of-session summary.
//!
//! Computed once from the recorder's final state. Snapshots are taken every
//! [`SNAPSHOT_INTERVAL_MS`], so focused time and streak length are counted in
//! whole snapshot intervals rather than measured.

use crate::accumulator::{longest_run, ScoreSample, INITIAL_SCORE};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_INTERVAL_MS: i64 = 3_000;
/// Snapshot score counted as focused time.
pub const FOCUSED_SCORE: u8 = 70;
pub const MAX_SUMMARY_POINTS: usize = 120;
/// Sessions shorter than this are not worth keeping.
pub const MIN_PERSIST_DURATION_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub start_time: i64,
    pub end_time: i64,
    /// Wall time minus paused time
    pub total_duration_ms: i64,
    pub paused_duration_ms: i64,
    pub average_score: u8,
    pub focused_percentage: u8,
    pub distraction_count: u32,
    pub peak_score: u8,
    pub longest_focus_streak_ms: i64,
    pub snapshots: Vec<ScoreSample>,
}

impl SessionSummary {
    /// Summarize `state` as if it ended at `end_time`.
    pub fn compute(state: &SessionState, end_time: i64) -> Self {
        let start_time = state.start_time.unwrap_or(end_time);
        let paused_duration_ms = state.total_paused_ms
            + state
                .paused_at
                .map(|paused_at| (end_time - paused_at).max(0))
                .unwrap_or(0);
        let total_duration_ms = end_time - start_time - paused_duration_ms;

        let snapshots = &state.snapshots;
        let average_score = if snapshots.is_empty() {
            0
        } else {
            let sum: u64 = snapshots.iter().map(|s| s.score as u64).sum();
            (sum as f64 / snapshots.len() as f64).round() as u8
        };

        let focused_percentage = if total_duration_ms > 0 {
            ((state.focused_ms as f64 / total_duration_ms as f64) * 100.0)
                .round()
                .min(100.0) as u8
        } else {
            0
        };

        let peak_score = snapshots
            .iter()
            .map(|s| s.score)
            .max()
            .unwrap_or(INITIAL_SCORE);

        let streak = longest_run(snapshots.iter().map(|s| s.score), FOCUSED_SCORE);

        Self {
            start_time,
            end_time,
            total_duration_ms,
            paused_duration_ms,
            average_score,
            focused_percentage,
            distraction_count: state.distraction_count,
            peak_score,
            longest_focus_streak_ms: streak as i64 * SNAPSHOT_INTERVAL_MS,
            snapshots: downsample(snapshots, MAX_SUMMARY_POINTS),
        }
    }

    pub fn is_worth_persisting(&self) -> bool {
        self.total_duration_ms >= MIN_PERSIST_DURATION_MS
    }
}

/// Every `ceil(len / max_points)`-th sample, plus the last one.
///
/// When the stride misses the final sample and the output is already full,
/// the last strided sample gives way to it.
pub fn downsample(samples: &[ScoreSample], max_points: usize) -> Vec<ScoreSample> {
    if samples.len() <= max_points || max_points == 0 {
        return samples.to_vec();
    }

    let step = samples.len().div_ceil(max_points);
    let mut result: Vec<ScoreSample> = samples.iter().step_by(step).copied().collect();

    if let Some(&last) = samples.last() {
        if (samples.len() - 1) % step != 0 {
            if result.len() >= max_points {
                result.pop();
            }
            result.push(last);
        }
    }
    result
}
