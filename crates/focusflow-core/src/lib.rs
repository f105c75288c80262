//! FocusFlow core: focus scoring and voice-coaching state machines.
//!
//! Per-frame face/gaze measurements become an instant attentiveness score,
//! a session score that only ever decays under sustained inattention, a
//! repeating distraction chime, and graduated voice nudges delivered through
//! injectable text, speech and playback collaborators.
//!
//! Start with [`FocusPipeline`]; every stage is also usable on its own.

#![allow(clippy::new_without_default)]

pub mod accumulator;
pub mod calibration;
pub mod chime;
pub mod circuit_breaker;
pub mod coaching;
pub mod config;
pub mod error;
pub mod nudge;
pub mod pipeline;
pub mod scoring;
pub mod session;
pub mod signal;
pub mod summary;
pub mod timing;

#[cfg(test)]
pub mod tests_config;
#[cfg(test)]
pub mod tests_proptest;

// ============================================================================
// CURATED PUBLIC API EXPORTS
// ============================================================================

// Signal + calibration
pub use calibration::{GazeCalibration, GazeCalibrator};
pub use signal::{
    normalize, Angles, BoundingBox, DetectionFrame, FaceDetection, Gaze, NormalizedSignal,
    Rotation,
};

// Scoring
pub use accumulator::{Evaluation, ScoreAccumulator, ScoreHistory, ScoreSample, SessionScoreState};
pub use scoring::{instant_score, Ema};

// Alerts + coaching policy
pub use chime::{ChimeController, ChimeEvent, ChimeState};
pub use nudge::{
    advance_escalation, can_trigger_nudge, escalation_tier, should_reset_escalation,
    update_score_history, DenyReason, EscalationTier, NudgeDecision, NudgePolicy, NudgeState,
};

// Coaching delivery
pub use coaching::{
    AudioCache, AudioPath, AudioPlayer, CoachingContext, CoachingEvent, CoachingRequest,
    CoachingUi, Collaborators, DeliveryOutcome, LocalSpeech, NudgeOrchestrator, PhrasePicker,
    SpeechService, TextGenerator, TextSource,
};

// Session
pub use pipeline::{FocusPipeline, PipelineEvent, PipelineOutput};
pub use session::{SessionPhase, SessionRecorder, SessionState};
pub use summary::{downsample, SessionSummary};

// Infrastructure
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfigError, ConfigIssue, FocusflowConfig};
pub use error::ServiceError;
pub use timing::{Clock, IntervalTimer, ManualClock, SystemClock};
