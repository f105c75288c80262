use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Tolerance for the scoring weights summing to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f32 = 0.05;

/// Soft configuration problem, reported but never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusflowConfig {
    pub scoring: ScoringConfig,
    pub calibration: CalibrationConfig,
    pub accumulator: AccumulatorConfig,
    pub chime: ChimeConfig,
    pub coaching: CoachingConfig,
    pub services: ServicesConfig,
}

/// Weights and thresholds for the per-frame instant score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Head pose is the most reliable signal
    pub head_pose_weight: f32,
    /// Gaze is noisy, kept low
    pub gaze_weight: f32,
    pub face_presence_weight: f32,
    /// Beyond these angles a sub-score drops to 0
    pub yaw_threshold_deg: f32,
    pub pitch_threshold_deg: f32,
    pub gaze_threshold_deg: f32,
    /// Lower bound applied to gaze confidence when a face is present
    pub gaze_confidence_floor: f32,
    /// EMA factor for the smoothed display score (user tunable mid-session)
    pub ema_alpha: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Face-present frames needed before the gaze offset freezes
    pub target_frames: u32,
    /// Raw gaze bearing (degrees) when looking straight ahead
    pub gaze_center_deg: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    pub eval_interval_ms: i64,
    /// Instant readings averaged per evaluation (~2s at 5 Hz)
    pub recent_window: usize,
    /// Average instant score below this counts as distracted
    pub distracted_threshold: f32,
    /// Consecutive distracted evaluations before the score moves
    pub sustained_evals_required: u32,
    pub decrement_step: u8,
    pub history_capacity: usize,
    /// History samples at or above this count toward a focus streak
    pub focus_threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeConfig {
    /// Points below baseline that start the alert
    pub drop_threshold: u8,
    pub chime_interval_ms: i64,
    /// No alert this long after start/reset (calibration plus buffer)
    pub warmup_ms: i64,
    /// Rolling instant average that ends the alert
    pub recovery_threshold: f32,
    /// Rolling instant average classified as distracted
    pub distraction_threshold: f32,
    /// Instant readings in the recovery average (~3s at 5 Hz)
    pub recent_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    /// Chimes in one episode before a voice nudge is considered
    pub chimes_to_activate: u32,
    pub cooldown_seconds: i64,
    pub grace_period_seconds: i64,
    pub enable_escalation: bool,
    /// Score every recent entry must reach to reset escalation
    pub sustained_focus_threshold: u8,
    /// Forced resolution of a playback that never reports completion
    pub playback_timeout_ms: u64,
    /// Synthesize the fallback phrase bank at session start
    pub prewarm_on_start: bool,
    pub prewarm_batch_size: usize,
    /// Fixed seed for fallback phrase selection (random when absent)
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub text_base_url: String,
    pub text_model: String,
    pub text_temperature: f32,
    pub speech_base_url: String,
    pub speech_voice_id: String,
    pub speech_model_id: String,
    pub request_timeout_ms: u64,
    /// Consecutive failures before a collaborator is skipped
    pub breaker_failure_threshold: u32,
    pub breaker_open_cooldown_ms: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            head_pose_weight: 0.6,
            gaze_weight: 0.2,
            face_presence_weight: 0.2,
            yaw_threshold_deg: 30.0,
            pitch_threshold_deg: 25.0,
            gaze_threshold_deg: 30.0,
            gaze_confidence_floor: 0.5,
            ema_alpha: 0.15,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_frames: 50,
            gaze_center_deg: 90.0,
        }
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            eval_interval_ms: 1_000,
            recent_window: 10,
            distracted_threshold: 65.0,
            sustained_evals_required: 3,
            decrement_step: 1,
            history_capacity: 300,
            focus_threshold: 70,
        }
    }
}

impl Default for ChimeConfig {
    fn default() -> Self {
        Self {
            drop_threshold: 2,
            chime_interval_ms: 1_500,
            warmup_ms: 12_000,
            recovery_threshold: 55.0,
            distraction_threshold: 45.0,
            recent_window: 15,
        }
    }
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            chimes_to_activate: 5,
            cooldown_seconds: 30,
            grace_period_seconds: 60,
            enable_escalation: true,
            sustained_focus_threshold: 70,
            playback_timeout_ms: 10_000,
            prewarm_on_start: true,
            prewarm_batch_size: 2,
            rng_seed: None,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            text_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            text_temperature: 0.8,
            speech_base_url: "https://api.elevenlabs.io/v1".to_string(),
            speech_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            speech_model_id: "eleven_flash_v2_5".to_string(),
            request_timeout_ms: 10_000,
            breaker_failure_threshold: 3,
            breaker_open_cooldown_ms: 30_000,
        }
    }
}

impl ScoringConfig {
    pub fn weight_sum(&self) -> f32 {
        self.head_pose_weight + self.gaze_weight + self.face_presence_weight
    }

    /// Change the smoothing factor; the only field allowed to move mid-session.
    pub fn set_ema_alpha(&mut self, alpha: f32) {
        self.ema_alpha = alpha.clamp(0.01, 1.0);
    }
}

impl FocusflowConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: FocusflowConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Variables are prefixed with FOCUSFLOW_, e.g. FOCUSFLOW_CHIME_DROP_THRESHOLD=4
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (if exists)
    /// 3. Default config file
    /// 4. Built-in defaults (lowest priority)
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = FocusflowConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        // A user file replaces the defaults wholesale; missing keys fall back
        // to built-in values through #[serde(default)].
        if let Some(path) = user_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        env_override("FOCUSFLOW_SCORING_EMA_ALPHA", &mut self.scoring.ema_alpha)?;
        env_override(
            "FOCUSFLOW_CALIBRATION_TARGET_FRAMES",
            &mut self.calibration.target_frames,
        )?;
        env_override(
            "FOCUSFLOW_ACCUMULATOR_DISTRACTED_THRESHOLD",
            &mut self.accumulator.distracted_threshold,
        )?;
        env_override(
            "FOCUSFLOW_ACCUMULATOR_SUSTAINED_EVALS_REQUIRED",
            &mut self.accumulator.sustained_evals_required,
        )?;
        env_override("FOCUSFLOW_CHIME_DROP_THRESHOLD", &mut self.chime.drop_threshold)?;
        env_override("FOCUSFLOW_CHIME_WARMUP_MS", &mut self.chime.warmup_ms)?;
        env_override(
            "FOCUSFLOW_CHIME_RECOVERY_THRESHOLD",
            &mut self.chime.recovery_threshold,
        )?;
        env_override(
            "FOCUSFLOW_COACHING_CHIMES_TO_ACTIVATE",
            &mut self.coaching.chimes_to_activate,
        )?;
        env_override(
            "FOCUSFLOW_COACHING_COOLDOWN_SECONDS",
            &mut self.coaching.cooldown_seconds,
        )?;
        env_override(
            "FOCUSFLOW_COACHING_GRACE_PERIOD_SECONDS",
            &mut self.coaching.grace_period_seconds,
        )?;
        if let Ok(val) = std::env::var("FOCUSFLOW_COACHING_RNG_SEED") {
            let seed = val.parse().map_err(|_| {
                ConfigError::Validation("Invalid FOCUSFLOW_COACHING_RNG_SEED".to_string())
            })?;
            self.coaching.rng_seed = Some(seed);
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        if [s.head_pose_weight, s.gaze_weight, s.face_presence_weight]
            .iter()
            .any(|&w| w < 0.0)
        {
            return Err(ConfigError::Validation(
                "scoring weights must be non-negative".to_string(),
            ));
        }
        if s.yaw_threshold_deg <= 0.0 || s.pitch_threshold_deg <= 0.0 || s.gaze_threshold_deg <= 0.0
        {
            return Err(ConfigError::Validation(
                "scoring angle thresholds must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&s.gaze_confidence_floor) {
            return Err(ConfigError::Validation(
                "scoring.gaze_confidence_floor must be in [0, 1]".to_string(),
            ));
        }
        if s.ema_alpha <= 0.0 || s.ema_alpha > 1.0 {
            return Err(ConfigError::Validation(
                "scoring.ema_alpha must be in (0, 1]".to_string(),
            ));
        }

        if self.calibration.target_frames == 0 {
            return Err(ConfigError::Validation(
                "calibration.target_frames must be > 0".to_string(),
            ));
        }

        let a = &self.accumulator;
        if a.eval_interval_ms <= 0 {
            return Err(ConfigError::Validation(
                "accumulator.eval_interval_ms must be positive".to_string(),
            ));
        }
        if a.recent_window == 0 || a.history_capacity == 0 {
            return Err(ConfigError::Validation(
                "accumulator windows must be non-empty".to_string(),
            ));
        }
        if a.sustained_evals_required == 0 {
            return Err(ConfigError::Validation(
                "accumulator.sustained_evals_required must be >= 1".to_string(),
            ));
        }
        if a.focus_threshold > 100 || a.distracted_threshold > 100.0 {
            return Err(ConfigError::Validation(
                "accumulator thresholds must be <= 100".to_string(),
            ));
        }

        let c = &self.chime;
        if c.recovery_threshold <= c.distraction_threshold {
            return Err(ConfigError::Validation(
                "chime.recovery_threshold must be > distraction_threshold".to_string(),
            ));
        }
        if c.chime_interval_ms <= 0 || c.warmup_ms < 0 {
            return Err(ConfigError::Validation(
                "chime intervals must be non-negative (interval > 0)".to_string(),
            ));
        }
        if c.recent_window == 0 {
            return Err(ConfigError::Validation(
                "chime.recent_window must be > 0".to_string(),
            ));
        }

        let k = &self.coaching;
        if k.chimes_to_activate == 0 {
            return Err(ConfigError::Validation(
                "coaching.chimes_to_activate must be >= 1".to_string(),
            ));
        }
        if k.cooldown_seconds < 0 || k.grace_period_seconds < 0 {
            return Err(ConfigError::Validation(
                "coaching timing windows must be non-negative".to_string(),
            ));
        }
        if k.prewarm_batch_size == 0 {
            return Err(ConfigError::Validation(
                "coaching.prewarm_batch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Problems that do not block the pipeline but deserve a log line.
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut out = Vec::new();
        let sum = self.scoring.weight_sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            out.push(ConfigIssue {
                field: "scoring.weights",
                message: format!("weights sum to {:.3}, expected ~1.0", sum),
            });
        }
        if self.coaching.playback_timeout_ms == 0 {
            out.push(ConfigIssue {
                field: "coaching.playback_timeout_ms",
                message: "0 resolves every playback immediately".to_string(),
            });
        }
        if self.accumulator.focus_threshold as f32 <= self.accumulator.distracted_threshold {
            out.push(ConfigIssue {
                field: "accumulator.focus_threshold",
                message: "focus threshold at or below the distracted threshold".to_string(),
            });
        }
        out
    }

    /// Export configuration to TOML string
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

pub(crate) fn env_override<T: FromStr>(name: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(name) {
        *slot = val
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid {}", name)))?;
    }
    Ok(())
}
