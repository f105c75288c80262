//! Per-user gaze center learned over the first frames of a session.
//!
//! The detector reports ~90° for "looking straight ahead", but the exact value
//! depends on camera placement. During calibration we keep the frame whose
//! bearing was closest to the nominal center and adopt its signed offset.
//! Once `target_frames` face-present frames have been seen, the offset is
//! frozen and `is_calibrated` never goes back to false (short of an explicit
//! [`GazeCalibrator::recalibrate`]).

use crate::config::CalibrationConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeCalibration {
    /// Signed offset added to the nominal center
    pub offset_deg: f32,
    pub is_calibrated: bool,
    pub min_deviation_seen: f32,
    pub frame_count: u32,
}

impl Default for GazeCalibration {
    fn default() -> Self {
        Self {
            offset_deg: 0.0,
            is_calibrated: false,
            min_deviation_seen: f32::MAX,
            frame_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GazeCalibrator {
    state: GazeCalibration,
    target_frames: u32,
    nominal_center_deg: f32,
    displayed_progress: f32,
}

impl GazeCalibrator {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            state: GazeCalibration::default(),
            target_frames: config.target_frames.max(1),
            nominal_center_deg: config.gaze_center_deg,
            displayed_progress: 0.0,
        }
    }

    /// Record one face-present frame. `bearing_deg` is `None` when the frame
    /// carries no gaze data; it still counts toward the target.
    pub fn observe(&mut self, bearing_deg: Option<f32>) {
        if self.state.is_calibrated {
            return;
        }

        self.state.frame_count += 1;

        if let Some(bearing) = bearing_deg {
            let offset = bearing - self.nominal_center_deg;
            if offset.abs() < self.state.min_deviation_seen {
                self.state.min_deviation_seen = offset.abs();
                self.state.offset_deg = offset;
            }
        }

        if self.state.frame_count >= self.target_frames {
            self.state.is_calibrated = true;
            log::info!(
                "Gaze calibration complete after {} frames (offset {:.1} deg)",
                self.state.frame_count,
                self.state.offset_deg
            );
        }
    }

    /// Bearing (degrees) treated as zero deviation.
    pub fn center_deg(&self) -> f32 {
        self.nominal_center_deg + self.state.offset_deg
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.is_calibrated
    }

    /// Raw progress in [0, 100] from the frame count.
    pub fn progress(&self) -> f32 {
        (self.state.frame_count as f32 / self.target_frames as f32 * 100.0).min(100.0)
    }

    /// Progress for display; moves toward [`progress`](Self::progress) one
    /// point per [`step_animation`](Self::step_animation) call.
    pub fn animated_progress(&self) -> f32 {
        self.displayed_progress
    }

    pub fn step_animation(&mut self) -> f32 {
        let target = self.progress();
        let diff = target - self.displayed_progress;
        if diff.abs() < 0.5 {
            self.displayed_progress = target;
        } else {
            self.displayed_progress += diff.signum();
        }
        self.displayed_progress
    }

    pub fn state(&self) -> &GazeCalibration {
        &self.state
    }

    /// Forget the learned offset and start over.
    pub fn recalibrate(&mut self) {
        self.state = GazeCalibration::default();
        self.displayed_progress = 0.0;
    }
}
