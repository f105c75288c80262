//! Coaching timing policy and escalation ladder.
//!
//! Everything here is a pure function over an immutable [`NudgeState`]:
//! callers query it, nothing is scheduled. Escalation climbs one tier per
//! delivered nudge (capped at direct) and only drops back to gentle, all at
//! once, after sustained high focus.

use crate::config::CoachingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_ESCALATION_LEVEL: u8 = 2;
pub const SCORE_HISTORY_LEN: usize = 5;
const RECOVERY_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTier {
    Gentle,
    Medium,
    Direct,
}

impl EscalationTier {
    pub const ALL: [EscalationTier; 3] = [Self::Gentle, Self::Medium, Self::Direct];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gentle => "gentle",
            Self::Medium => "medium",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 0 gentle, 1 medium, anything higher direct.
pub fn escalation_tier(level: u8) -> EscalationTier {
    match level {
        0 => EscalationTier::Gentle,
        1 => EscalationTier::Medium,
        _ => EscalationTier::Direct,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeState {
    pub session_start_time: i64,
    /// `None` until the first nudge is delivered
    pub last_nudge_time: Option<i64>,
    pub escalation_level: u8,
    pub consecutive_distractions: u32,
    pub score_history: Vec<u8>,
}

impl NudgeState {
    pub fn new(session_start_time: i64) -> Self {
        Self {
            session_start_time,
            last_nudge_time: None,
            escalation_level: 0,
            consecutive_distractions: 0,
            score_history: Vec::with_capacity(SCORE_HISTORY_LEN),
        }
    }

    pub fn tier(&self) -> EscalationTier {
        escalation_tier(self.escalation_level)
    }

    pub fn with_last_nudge_time(&self, now_ms: i64) -> Self {
        Self {
            last_nudge_time: Some(now_ms),
            ..self.clone()
        }
    }

    pub fn with_escalation_reset(&self) -> Self {
        Self {
            escalation_level: 0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    GracePeriod,
    Cooldown,
    Recovering,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GracePeriod => "grace-period",
            Self::Cooldown => "cooldown",
            Self::Recovering => "recovering",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl NudgeDecision {
    pub const ALLOW: Self = Self {
        allowed: true,
        reason: None,
    };

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Timing windows applied by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgePolicy {
    pub grace_period_ms: i64,
    pub cooldown_ms: i64,
    pub sustained_focus_threshold: u8,
}

impl Default for NudgePolicy {
    fn default() -> Self {
        Self::from(&CoachingConfig::default())
    }
}

impl From<&CoachingConfig> for NudgePolicy {
    fn from(config: &CoachingConfig) -> Self {
        Self {
            grace_period_ms: config.grace_period_seconds.saturating_mul(1_000),
            cooldown_ms: config.cooldown_seconds.saturating_mul(1_000),
            sustained_focus_threshold: config.sustained_focus_threshold,
        }
    }
}

impl NudgePolicy {
    /// Checked in order: grace period, cooldown, active recovery.
    pub fn can_trigger_nudge(&self, state: &NudgeState, _current_score: u8, now_ms: i64) -> NudgeDecision {
        if now_ms - state.session_start_time < self.grace_period_ms {
            return NudgeDecision::deny(DenyReason::GracePeriod);
        }

        if let Some(last) = state.last_nudge_time {
            if now_ms - last < self.cooldown_ms {
                return NudgeDecision::deny(DenyReason::Cooldown);
            }
        }

        if is_recovering(&state.score_history) {
            return NudgeDecision::deny(DenyReason::Recovering);
        }

        NudgeDecision::ALLOW
    }

    /// True only when the full history window sits at or above the threshold.
    pub fn should_reset_escalation(&self, state: &NudgeState) -> bool {
        state.score_history.len() >= SCORE_HISTORY_LEN
            && state
                .score_history
                .iter()
                .all(|&s| s >= self.sustained_focus_threshold)
    }
}

/// Last three entries trend upward: non-decreasing with a net rise.
fn is_recovering(history: &[u8]) -> bool {
    if history.len() < RECOVERY_WINDOW {
        return false;
    }
    let recent = &history[history.len() - RECOVERY_WINDOW..];
    recent[1] >= recent[0] && recent[2] >= recent[1] && recent[2] > recent[0]
}

/// [`NudgePolicy::can_trigger_nudge`] with default windows (60s grace, 30s cooldown).
pub fn can_trigger_nudge(state: &NudgeState, current_score: u8, now_ms: i64) -> NudgeDecision {
    NudgePolicy::default().can_trigger_nudge(state, current_score, now_ms)
}

/// [`NudgePolicy::should_reset_escalation`] with the default threshold of 70.
pub fn should_reset_escalation(state: &NudgeState) -> bool {
    NudgePolicy::default().should_reset_escalation(state)
}

pub fn advance_escalation(state: &NudgeState) -> NudgeState {
    NudgeState {
        escalation_level: state.escalation_level.saturating_add(1).min(MAX_ESCALATION_LEVEL),
        consecutive_distractions: state.consecutive_distractions + 1,
        ..state.clone()
    }
}

pub fn update_score_history(state: &NudgeState, score: u8) -> NudgeState {
    let mut score_history = state.score_history.clone();
    score_history.push(score);
    if score_history.len() > SCORE_HISTORY_LEN {
        score_history.drain(..score_history.len() - SCORE_HISTORY_LEN);
    }
    NudgeState {
        score_history,
        ..state.clone()
    }
}
