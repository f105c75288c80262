//! Distraction alert controller.
//!
//! Watches the session score against a running baseline and starts a
//! repeating chime once the score falls `drop_threshold` points below it.
//! Because the session score never recovers, the alert ends on a separate
//! rolling average of instant scores crossing `recovery_threshold`, which is
//! kept above `distraction_threshold` so the alert does not flap.
//!
//! # Invariants
//! - `chime_count == 0` whenever `is_active` is false.
//! - No alert starts inside the warm-up window after start or reset.

use crate::config::ChimeConfig;
use crate::timing::IntervalTimer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChimeEvent {
    AlertStarted,
    Chime { count: u32 },
    AlertStopped { total_chimes: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimeState {
    pub baseline_score: u8,
    pub lowest_score_during_drop: u8,
    pub is_active: bool,
    pub chime_count: u32,
    pub recent_instant_buffer: VecDeque<u8>,
}

impl Default for ChimeState {
    fn default() -> Self {
        Self {
            baseline_score: 100,
            lowest_score_during_drop: 100,
            is_active: false,
            chime_count: 0,
            recent_instant_buffer: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChimeController {
    config: ChimeConfig,
    state: ChimeState,
    started_at_ms: i64,
    repeat: IntervalTimer,
}

impl ChimeController {
    pub fn new(config: ChimeConfig, now_ms: i64) -> Self {
        Self {
            repeat: IntervalTimer::new(config.chime_interval_ms),
            config,
            state: ChimeState::default(),
            started_at_ms: now_ms,
        }
    }

    pub fn in_warmup(&self, now_ms: i64) -> bool {
        now_ms - self.started_at_ms < self.config.warmup_ms
    }

    /// Feed one frame: the current session score and the frame's instant score.
    pub fn update(&mut self, session_score: u8, instant_score: u8, now_ms: i64) -> Vec<ChimeEvent> {
        let mut events = Vec::new();

        let buf = &mut self.state.recent_instant_buffer;
        while buf.len() >= self.config.recent_window.max(1) {
            buf.pop_front();
        }
        buf.push_back(instant_score);

        if !self.state.is_active && session_score > self.state.baseline_score {
            self.state.baseline_score = session_score;
            self.state.lowest_score_during_drop = session_score;
        }

        let drop = self.state.baseline_score.saturating_sub(session_score);
        if !self.state.is_active && !self.in_warmup(now_ms) && drop >= self.config.drop_threshold {
            log::info!(
                "Distraction alert started (baseline {}, score {}, drop {})",
                self.state.baseline_score,
                session_score,
                drop
            );
            self.state.lowest_score_during_drop = session_score;
            self.state.is_active = true;
            self.repeat.start(now_ms);
            events.push(ChimeEvent::AlertStarted);
            events.push(self.fire());
        }

        if self.state.is_active && session_score < self.state.lowest_score_during_drop {
            self.state.lowest_score_during_drop = session_score;
        }

        if self.state.is_active {
            if let Some(avg) = self.recent_average() {
                if avg >= self.config.recovery_threshold {
                    events.push(self.stop_alert());
                    self.state.baseline_score = session_score;
                    self.state.lowest_score_during_drop = session_score;
                }
            }
        }

        events
    }

    /// Fire the repeating chime if its interval has elapsed.
    pub fn poll(&mut self, now_ms: i64) -> Option<ChimeEvent> {
        if self.state.is_active && self.repeat.poll(now_ms) {
            Some(self.fire())
        } else {
            None
        }
    }

    fn fire(&mut self) -> ChimeEvent {
        self.state.chime_count += 1;
        log::debug!("Chime (count: {})", self.state.chime_count);
        ChimeEvent::Chime {
            count: self.state.chime_count,
        }
    }

    fn stop_alert(&mut self) -> ChimeEvent {
        let total_chimes = self.state.chime_count;
        log::info!("Distraction alert stopped after {} chimes", total_chimes);
        self.state.is_active = false;
        self.state.chime_count = 0;
        self.repeat.cancel();
        ChimeEvent::AlertStopped { total_chimes }
    }

    /// End any active alert without touching the baseline (session end).
    pub fn stop(&mut self) -> Option<ChimeEvent> {
        if self.state.is_active {
            Some(self.stop_alert())
        } else {
            None
        }
    }

    /// Clear everything (baseline 100) and restart the warm-up window.
    pub fn reset(&mut self, now_ms: i64) {
        self.repeat.cancel();
        self.state = ChimeState::default();
        self.started_at_ms = now_ms;
    }

    pub fn recent_average(&self) -> Option<f32> {
        let buf = &self.state.recent_instant_buffer;
        if buf.is_empty() {
            return None;
        }
        let sum: u32 = buf.iter().map(|&s| s as u32).sum();
        Some(sum as f32 / buf.len() as f32)
    }

    /// Rolling instant average below the distraction threshold.
    pub fn is_distracted(&self) -> bool {
        self.recent_average()
            .map(|avg| avg < self.config.distraction_threshold)
            .unwrap_or(false)
    }

    pub fn chime_count(&self) -> u32 {
        self.state.chime_count
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn state(&self) -> &ChimeState {
        &self.state
    }
}
