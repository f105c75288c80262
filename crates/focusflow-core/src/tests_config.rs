#[cfg(test)]
mod tests {
    use crate::config::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_valid() {
        let config = FocusflowConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.issues().is_empty());
    }

    #[test]
    fn test_default_values() {
        let config = FocusflowConfig::default();
        assert_eq!(config.calibration.target_frames, 50);
        assert_eq!(config.accumulator.sustained_evals_required, 3);
        assert_eq!(config.accumulator.history_capacity, 300);
        assert_eq!(config.chime.chime_interval_ms, 1_500);
        assert_eq!(config.chime.warmup_ms, 12_000);
        assert_eq!(config.coaching.chimes_to_activate, 5);
        assert_eq!(config.coaching.grace_period_seconds, 60);
        assert_eq!(config.coaching.cooldown_seconds, 30);
        assert!((config.scoring.weight_sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_recovery_must_exceed_distraction() {
        let mut config = FocusflowConfig::default();
        config.chime.recovery_threshold = 45.0;
        config.chime.distraction_threshold = 45.0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recovery_threshold"));
    }

    #[test]
    fn test_invalid_ema_alpha() {
        let mut config = FocusflowConfig::default();
        config.scoring.ema_alpha = 0.0;
        assert!(config.validate().is_err());

        config.scoring.ema_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_calibration_target_rejected() {
        let mut config = FocusflowConfig::default();
        config.calibration.target_frames = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_weight_sum_is_soft_issue() {
        let mut config = FocusflowConfig::default();
        config.scoring.head_pose_weight = 0.9;

        // Still valid, but flagged.
        assert!(config.validate().is_ok());
        let issues = config.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "scoring.weights");
    }

    #[test]
    fn test_set_ema_alpha_clamps() {
        let mut scoring = ScoringConfig::default();
        scoring.set_ema_alpha(3.0);
        assert_eq!(scoring.ema_alpha, 1.0);
        scoring.set_ema_alpha(-1.0);
        assert!(scoring.ema_alpha > 0.0);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = FocusflowConfig::default();
        config.coaching.rng_seed = Some(42);
        config.chime.drop_threshold = 8;

        let toml_str = config.to_toml_string().unwrap();
        let parsed: FocusflowConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.coaching.rng_seed, Some(42));
        assert_eq!(parsed.chime.drop_threshold, 8);
        assert_eq!(parsed.services.text_model, config.services.text_model);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[chime]\ndrop_threshold = 4\n\n[coaching]\ncooldown_seconds = 45").unwrap();

        let config = FocusflowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.chime.drop_threshold, 4);
        assert_eq!(config.coaching.cooldown_seconds, 45);
        assert_eq!(config.chime.warmup_ms, 12_000);
        assert_eq!(config.calibration.target_frames, 50);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[chime]\nrecovery_threshold = 30.0").unwrap();

        let result = FocusflowConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[chime\ndrop_threshold = ").unwrap();

        let result = FocusflowConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = FocusflowConfig::default();
        config.accumulator.distracted_threshold = 60.0;

        config.save_to_file(file.path()).unwrap();
        let loaded = FocusflowConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.accumulator.distracted_threshold, 60.0);
    }

    #[test]
    fn test_load_layered_missing_files() {
        let missing = std::path::Path::new("/nonexistent/focusflow.toml");
        let config = FocusflowConfig::load_layered(Some(missing), None).unwrap();
        assert_eq!(config.calibration.target_frames, 50);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("FOCUSFLOW_CHIME_DROP_THRESHOLD", "6");
        let mut config = FocusflowConfig::default();
        config.apply_env_overrides().unwrap();
        std::env::remove_var("FOCUSFLOW_CHIME_DROP_THRESHOLD");

        assert_eq!(config.chime.drop_threshold, 6);
    }

    #[test]
    fn test_env_override_invalid_value() {
        std::env::set_var("FOCUSFLOW_TEST_UNPARSEABLE", "fifty");
        let mut frames: u32 = 50;
        let result = env_override("FOCUSFLOW_TEST_UNPARSEABLE", &mut frames);
        std::env::remove_var("FOCUSFLOW_TEST_UNPARSEABLE");

        assert!(result.is_err());
        assert_eq!(frames, 50);
    }
}
