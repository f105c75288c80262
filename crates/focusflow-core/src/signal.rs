//! Detection frames and the normalized per-frame signal derived from them.

use crate::calibration::GazeCalibrator;
use serde::{Deserialize, Serialize};

/// Face bounding box in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Head rotation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Gaze direction. `bearing` is in radians, centered at PI/2 when looking ahead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Gaze {
    pub bearing: f32,
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub angle: Angles,
    pub gaze: Gaze,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    /// Detector presence score
    pub score: f32,
    pub rotation: Option<Rotation>,
}

/// One detector result. Only the first face is ever used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub faces: Vec<FaceDetection>,
    pub timestamp_ms: i64,
}

impl DetectionFrame {
    pub fn empty(timestamp_ms: i64) -> Self {
        Self {
            faces: Vec::new(),
            timestamp_ms,
        }
    }

    pub fn with_face(timestamp_ms: i64, face: FaceDetection) -> Self {
        Self {
            faces: vec![face],
            timestamp_ms,
        }
    }

    pub fn primary_face(&self) -> Option<&FaceDetection> {
        self.faces.first()
    }
}

/// Per-frame measurement in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSignal {
    pub yaw_deg: f32,
    pub pitch_deg: f32,
    /// Absolute distance from the calibrated gaze center, always >= 0
    pub gaze_deviation_deg: f32,
    /// In [0, 1]
    pub gaze_confidence: f32,
    pub face_present: bool,
}

impl NormalizedSignal {
    pub const ABSENT: Self = Self {
        yaw_deg: 0.0,
        pitch_deg: 0.0,
        gaze_deviation_deg: 0.0,
        gaze_confidence: 0.0,
        face_present: false,
    };

    /// A face is in frame but the detector produced no pose.
    pub const POSELESS: Self = Self {
        face_present: true,
        ..Self::ABSENT
    };
}

/// Convert a frame into a [`NormalizedSignal`], feeding the calibrator on the way.
///
/// Missing faces and missing pose are valid input and never fail.
pub fn normalize(frame: &DetectionFrame, calibrator: &mut GazeCalibrator) -> NormalizedSignal {
    let Some(face) = frame.primary_face() else {
        return NormalizedSignal::ABSENT;
    };

    let Some(rotation) = face.rotation else {
        calibrator.observe(None);
        return NormalizedSignal::POSELESS;
    };

    let bearing_deg = rotation.gaze.bearing.to_degrees();
    let bearing = bearing_deg.is_finite().then_some(bearing_deg);
    calibrator.observe(bearing);

    let gaze_deviation_deg = bearing
        .map(|b| (b - calibrator.center_deg()).abs())
        .unwrap_or(0.0);

    NormalizedSignal {
        yaw_deg: finite_or_zero(rotation.angle.yaw.to_degrees()),
        pitch_deg: finite_or_zero(rotation.angle.pitch.to_degrees()),
        gaze_deviation_deg,
        gaze_confidence: finite_or_zero(rotation.gaze.strength).clamp(0.0, 1.0),
        face_present: true,
    }
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
