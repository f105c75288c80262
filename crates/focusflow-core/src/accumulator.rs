//! Session score accumulator.
//!
//! Instant scores arrive with every frame, but the session score only moves on
//! a fixed evaluation cadence. Each evaluation averages the recent instant
//! readings; after `sustained_evals_required` consecutive below-threshold
//! evaluations the score drops by one step per evaluation.
//!
//! # Invariants
//! - `current_score` never increases except through [`ScoreAccumulator::reset`].
//! - History only grows when the score changes, and holds at most
//!   `history_capacity` samples.

use crate::config::AccumulatorConfig;
use crate::timing::IntervalTimer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const INITIAL_SCORE: u8 = 100;

/// One `(time, score)` point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSample {
    pub time_ms: i64,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScoreState {
    pub current_score: u8,
    pub last_eval_time: i64,
    pub recent_instant_scores: VecDeque<u8>,
    pub consecutive_below_threshold_evals: u32,
}

impl SessionScoreState {
    fn new(now_ms: i64) -> Self {
        Self {
            current_score: INITIAL_SCORE,
            last_eval_time: now_ms,
            recent_instant_scores: VecDeque::new(),
            consecutive_below_threshold_evals: 0,
        }
    }
}

/// Outcome of one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub time_ms: i64,
    /// Mean of the recent buffer; `None` when no frame arrived yet
    pub average: Option<f32>,
    pub consecutive_below: u32,
    pub score: u8,
    pub score_changed: bool,
}

// ============================================================================
// SCORE HISTORY
// ============================================================================

/// Sliding window of score samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistory {
    samples: VecDeque<ScoreSample>,
    capacity: usize,
}

impl ScoreHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: ScoreSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoreSample> + '_ {
        self.samples.iter()
    }

    pub fn last(&self) -> Option<&ScoreSample> {
        self.samples.back()
    }

    pub fn to_vec(&self) -> Vec<ScoreSample> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Longest run of consecutive samples scoring at least `threshold`.
    pub fn longest_run_at_or_above(&self, threshold: u8) -> usize {
        longest_run(self.samples.iter().map(|s| s.score), threshold)
    }
}

pub(crate) fn longest_run(scores: impl Iterator<Item = u8>, threshold: u8) -> usize {
    let mut best = 0;
    let mut current = 0;
    for score in scores {
        if score >= threshold {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    config: AccumulatorConfig,
    state: SessionScoreState,
    history: ScoreHistory,
    timer: IntervalTimer,
}

impl ScoreAccumulator {
    /// Create an accumulator whose evaluation cadence starts at `now_ms`.
    pub fn new(config: AccumulatorConfig, now_ms: i64) -> Self {
        let mut timer = IntervalTimer::new(config.eval_interval_ms);
        timer.start(now_ms);
        Self {
            history: ScoreHistory::new(config.history_capacity),
            state: SessionScoreState::new(now_ms),
            config,
            timer,
        }
    }

    /// Record one frame's instant score.
    pub fn push_instant(&mut self, score: u8) {
        let buf = &mut self.state.recent_instant_scores;
        while buf.len() >= self.config.recent_window.max(1) {
            buf.pop_front();
        }
        buf.push_back(score.min(100));
    }

    /// Run an evaluation if one is due at `now_ms`. Missed ticks are skipped.
    pub fn tick(&mut self, now_ms: i64) -> Option<Evaluation> {
        if self.timer.poll(now_ms) {
            Some(self.evaluate(now_ms))
        } else {
            None
        }
    }

    /// Evaluate immediately, regardless of the timer.
    pub fn evaluate(&mut self, now_ms: i64) -> Evaluation {
        self.state.last_eval_time = now_ms;
        let average = self.recent_average();

        let mut score_changed = false;
        if let Some(avg) = average {
            if avg < self.config.distracted_threshold {
                self.state.consecutive_below_threshold_evals += 1;
            } else {
                self.state.consecutive_below_threshold_evals = 0;
            }

            if self.state.consecutive_below_threshold_evals >= self.config.sustained_evals_required {
                let next = self
                    .state
                    .current_score
                    .saturating_sub(self.config.decrement_step);
                if next != self.state.current_score {
                    self.state.current_score = next;
                    self.history.push(ScoreSample {
                        time_ms: now_ms,
                        score: next,
                    });
                    score_changed = true;
                    log::debug!(
                        "Score eval: avg={:.0}, consecutive={}/{}, score={}",
                        avg,
                        self.state.consecutive_below_threshold_evals,
                        self.config.sustained_evals_required,
                        next
                    );
                }
            }
        }

        Evaluation {
            time_ms: now_ms,
            average,
            consecutive_below: self.state.consecutive_below_threshold_evals,
            score: self.state.current_score,
            score_changed,
        }
    }

    pub fn recent_average(&self) -> Option<f32> {
        let buf = &self.state.recent_instant_scores;
        if buf.is_empty() {
            return None;
        }
        let sum: u32 = buf.iter().map(|&s| s as u32).sum();
        Some(sum as f32 / buf.len() as f32)
    }

    pub fn current_score(&self) -> u8 {
        self.state.current_score
    }

    pub fn state(&self) -> &SessionScoreState {
        &self.state
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    pub fn longest_focus_run(&self) -> usize {
        self.history
            .longest_run_at_or_above(self.config.focus_threshold)
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Stop evaluating (session end). Pending state is kept for reading.
    pub fn stop(&mut self) {
        self.timer.cancel();
    }

    /// Restart the evaluation cadence from `now_ms` after [`stop`](Self::stop),
    /// keeping the score.
    pub fn resume(&mut self, now_ms: i64) {
        self.timer.start(now_ms);
    }

    /// Score back to 100, history and counters cleared, cadence restarted.
    pub fn reset(&mut self, now_ms: i64) {
        self.state = SessionScoreState::new(now_ms);
        self.history.clear();
        self.timer.start(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator() -> ScoreAccumulator {
        ScoreAccumulator::new(AccumulatorConfig::default(), 0)
    }

    /// Fill the buffer with `avg` and run one evaluation at `t`.
    fn eval_with(acc: &mut ScoreAccumulator, avg: u8, t: i64) -> Evaluation {
        for _ in 0..10 {
            acc.push_instant(avg);
        }
        acc.evaluate(t)
    }

    #[test]
    fn test_drop_after_three_sustained_ticks() {
        let mut acc = accumulator();
        let e1 = eval_with(&mut acc, 60, 1_000);
        let e2 = eval_with(&mut acc, 62, 2_000);
        assert_eq!(e1.score, 100);
        assert_eq!(e2.score, 100);
        assert!(!e2.score_changed);

        let e3 = eval_with(&mut acc, 61, 3_000);
        assert_eq!(e3.score, 99);
        assert!(e3.score_changed);
        assert_eq!(acc.history().len(), 1);
    }

    #[test]
    fn test_focused_tick_resets_counter() {
        let mut acc = accumulator();
        eval_with(&mut acc, 50, 1_000);
        eval_with(&mut acc, 50, 2_000);
        let e = eval_with(&mut acc, 80, 3_000);
        assert_eq!(e.consecutive_below, 0);
        eval_with(&mut acc, 50, 4_000);
        eval_with(&mut acc, 50, 5_000);
        assert_eq!(acc.current_score(), 100);
    }

    #[test]
    fn test_continues_dropping_while_distracted() {
        let mut acc = accumulator();
        for t in 1..=10 {
            eval_with(&mut acc, 20, t * 1_000);
        }
        // Ticks 3..=10 each drop one point.
        assert_eq!(acc.current_score(), 92);
        assert_eq!(acc.history().len(), 8);
    }

    #[test]
    fn test_empty_buffer_no_classification() {
        let mut acc = accumulator();
        eval_with(&mut acc, 10, 1_000);
        eval_with(&mut acc, 10, 2_000);

        let mut fresh = accumulator();
        let e = fresh.evaluate(1_000);
        assert_eq!(e.average, None);
        assert_eq!(e.consecutive_below, 0);

        acc.reset(2_500);
        let e = acc.evaluate(3_000);
        assert_eq!(e.average, None);
        assert_eq!(e.consecutive_below, 0);
    }

    #[test]
    fn test_floor_at_zero() {
        let mut config = AccumulatorConfig::default();
        config.decrement_step = 60;
        config.sustained_evals_required = 1;
        let mut acc = ScoreAccumulator::new(config, 0);

        eval_with(&mut acc, 0, 1_000);
        eval_with(&mut acc, 0, 2_000);
        let e = eval_with(&mut acc, 0, 3_000);
        assert_eq!(e.score, 0);
        assert!(!e.score_changed, "no history sample when already at floor");
        assert_eq!(acc.history().len(), 2);
    }

    #[test]
    fn test_tick_follows_interval() {
        let mut acc = accumulator();
        acc.push_instant(30);
        assert!(acc.tick(500).is_none());
        assert!(acc.tick(1_000).is_some());
        assert!(acc.tick(1_400).is_none());
        // Host stall: one evaluation, not five.
        assert!(acc.tick(7_000).is_some());
        assert!(acc.tick(7_500).is_none());
    }

    #[test]
    fn test_history_capped() {
        let mut config = AccumulatorConfig::default();
        config.history_capacity = 5;
        config.sustained_evals_required = 1;
        let mut acc = ScoreAccumulator::new(config, 0);
        for t in 1..=20 {
            eval_with(&mut acc, 0, t * 1_000);
        }
        assert_eq!(acc.history().len(), 5);
        assert_eq!(acc.history().last().map(|s| s.score), Some(80));
    }

    #[test]
    fn test_longest_focus_run() {
        let mut history = ScoreHistory::new(10);
        for (i, score) in [75, 72, 68, 90, 85, 80, 40].into_iter().enumerate() {
            history.push(ScoreSample {
                time_ms: i as i64,
                score,
            });
        }
        assert_eq!(history.longest_run_at_or_above(70), 3);
        assert_eq!(ScoreHistory::new(3).longest_run_at_or_above(70), 0);
    }

    #[test]
    fn test_reset() {
        let mut acc = accumulator();
        for t in 1..=5 {
            eval_with(&mut acc, 10, t * 1_000);
        }
        assert!(acc.current_score() < 100);

        acc.reset(6_000);
        assert_eq!(acc.current_score(), 100);
        assert!(acc.history().is_empty());
        assert_eq!(acc.state().consecutive_below_threshold_evals, 0);
        assert!(acc.state().recent_instant_scores.is_empty());
        assert!(acc.tick(6_500).is_none());
        assert!(acc.tick(7_000).is_some());
    }
}
