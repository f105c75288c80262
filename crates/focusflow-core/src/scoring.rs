//! Per-frame attentiveness score and display smoothing.

use crate::config::ScoringConfig;
use crate::signal::NormalizedSignal;
use serde::{Deserialize, Serialize};

/// Instant attentiveness for one frame, 0..=100.
///
/// Total and deterministic: any signal yields a score, identical inputs
/// yield identical outputs. A missing face dominates and scores 0.
pub fn instant_score(signal: &NormalizedSignal, config: &ScoringConfig) -> u8 {
    if !signal.face_present {
        return 0;
    }

    let yaw = sub_score(signal.yaw_deg, config.yaw_threshold_deg);
    let pitch = sub_score(signal.pitch_deg, config.pitch_threshold_deg);
    let head = (yaw + pitch) / 2.0;

    let direction = sub_score(signal.gaze_deviation_deg, config.gaze_threshold_deg);
    let gaze = direction * signal.gaze_confidence.max(config.gaze_confidence_floor);

    let raw = head * config.head_pose_weight
        + gaze * config.gaze_weight
        + config.face_presence_weight;

    let scaled = (raw * 100.0).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, 100.0) as u8
}

/// `max(0, 1 - |value| / threshold)`; a non-positive threshold scores 0.
fn sub_score(value: f32, threshold: f32) -> f32 {
    if threshold <= 0.0 {
        return 0.0;
    }
    (1.0 - value.abs() / threshold).max(0.0)
}

/// Exponential moving average for the smoothed instant score.
///
/// The first sample passes through unchanged. `alpha` may be changed at any
/// time without losing the running value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ema {
    alpha: f32,
    value: Option<f32>,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        let next = match self.value {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    /// Rounded value for display; `None` before the first sample.
    pub fn rounded(&self) -> Option<u8> {
        self.value.map(|v| v.round().clamp(0.0, 100.0) as u8)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.01, 1.0);
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
