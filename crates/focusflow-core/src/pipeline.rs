//! Pipeline facade wiring the scoring chain to coaching.
//!
//! ```text
//! DetectionFrame ─► normalize (+ calibrator) ─► instant_score ─┬─► Ema (display)
//!                                                             ├─► ScoreAccumulator ─► session score
//!                                                             └─► ChimeController ─► chime count
//!                                                                                        │
//!                                  SessionRecorder ◄── snapshots            NudgeOrchestrator
//! ```
//!
//! The host calls [`FocusPipeline::on_frame`] for every detection frame and
//! [`FocusPipeline::tick`] on a steady cadence (every frame is fine). All
//! timers are polled against the injected [`Clock`], so nothing here spawns
//! except the orchestrator's delivery tasks.

use crate::accumulator::{ScoreAccumulator, ScoreSample};
use crate::calibration::GazeCalibrator;
use crate::chime::{ChimeController, ChimeEvent};
use crate::coaching::{AudioCache, Collaborators, CoachingEvent, NudgeOrchestrator};
use crate::config::FocusflowConfig;
use crate::nudge::EscalationTier;
use crate::scoring::{instant_score, Ema};
use crate::session::{SessionPhase, SessionRecorder};
use crate::signal::{normalize, DetectionFrame};
use crate::summary::SessionSummary;
use crate::timing::Clock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ScoreChanged { time_ms: i64, score: u8 },
    Chime(ChimeEvent),
    Coaching(CoachingEvent),
    Snapshot(ScoreSample),
}

/// Everything a UI needs after a frame or tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub phase: SessionPhase,
    pub instant_score: u8,
    pub smoothed_score: Option<u8>,
    pub session_score: u8,
    pub history: Vec<ScoreSample>,
    pub is_calibrated: bool,
    pub calibration_progress: f32,
    pub animated_progress: f32,
    pub chime_count: u32,
    pub alert_active: bool,
    pub nudge_active: bool,
    pub active_tier: Option<EscalationTier>,
    pub current_message: Option<String>,
}

#[derive(Debug)]
pub struct FocusPipeline {
    config: FocusflowConfig,
    clock: Arc<dyn Clock>,
    calibrator: GazeCalibrator,
    ema: Ema,
    accumulator: ScoreAccumulator,
    chime: ChimeController,
    orchestrator: NudgeOrchestrator,
    recorder: SessionRecorder,
    last_instant: u8,
}

impl FocusPipeline {
    /// Build a pipeline. Invalid configuration is logged, not rejected.
    pub fn new(
        config: FocusflowConfig,
        services: Collaborators,
        cache: AudioCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("Configuration failed validation, continuing anyway: {}", e);
        }
        for issue in config.issues() {
            log::warn!("Configuration issue: {}", issue);
        }

        let now = clock.now_ms();
        let mut accumulator = ScoreAccumulator::new(config.accumulator.clone(), now);
        accumulator.stop();

        Self {
            calibrator: GazeCalibrator::new(&config.calibration),
            ema: Ema::new(config.scoring.ema_alpha),
            accumulator,
            chime: ChimeController::new(config.chime.clone(), now),
            orchestrator: NudgeOrchestrator::new(
                config.coaching.clone(),
                &config.services,
                services,
                cache,
                Arc::clone(&clock),
            ),
            recorder: SessionRecorder::new(),
            last_instant: 0,
            config,
            clock,
        }
    }

    // ========================================================================
    // SESSION CONTROL
    // ========================================================================

    /// Start a fresh session. Scores, alerts, coaching UI and nudge state
    /// (grace period, cooldown, escalation) are reset; only calibration
    /// carries over.
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        self.accumulator.reset(now);
        self.chime.reset(now);
        self.ema.reset();
        self.orchestrator.reset_session();
        self.orchestrator.start_session(now);
        self.recorder.start(now);
    }

    pub fn pause(&mut self) -> Vec<PipelineEvent> {
        let now = self.clock.now_ms();
        if !self.recorder.pause(now) {
            return Vec::new();
        }
        self.accumulator.stop();
        self.orchestrator.reset();
        self.stop_alert(now)
    }

    pub fn resume(&mut self) -> bool {
        let now = self.clock.now_ms();
        if !self.recorder.resume(now) {
            return false;
        }
        self.accumulator.resume(now);
        true
    }

    /// End the session and return its summary; `None` when no session was live.
    pub fn end(&mut self) -> Option<SessionSummary> {
        let now = self.clock.now_ms();
        let summary = self.recorder.end(now)?;
        self.accumulator.stop();
        self.chime.stop();
        self.orchestrator.reset_session();
        Some(summary)
    }

    /// Restore the score to 100 and clear history, alerts and any in-flight
    /// nudge. Idempotent; calibration and the session phase are untouched.
    pub fn reset(&mut self) {
        let now = self.clock.now_ms();
        self.accumulator.reset(now);
        if self.recorder.phase() != SessionPhase::Running {
            self.accumulator.stop();
        }
        self.chime.reset(now);
        self.ema.reset();
        self.orchestrator.reset();
        self.last_instant = 0;
    }

    pub fn recalibrate(&mut self) {
        log::info!("Recalibrating gaze center");
        self.calibrator.recalibrate();
    }

    /// Adjust display smoothing mid-session without resetting it.
    pub fn set_ema_alpha(&mut self, alpha: f32) {
        self.config.scoring.set_ema_alpha(alpha);
        self.ema.set_alpha(self.config.scoring.ema_alpha);
    }

    // ========================================================================
    // DRIVING
    // ========================================================================

    /// Process one detection frame.
    pub fn on_frame(&mut self, frame: &DetectionFrame) -> Vec<PipelineEvent> {
        let now = self.clock.now_ms();
        let signal = normalize(frame, &mut self.calibrator);
        self.calibrator.step_animation();

        let score = instant_score(&signal, &self.config.scoring);
        self.last_instant = score;
        self.ema.update(score as f32);

        if self.recorder.phase() != SessionPhase::Running {
            return Vec::new();
        }

        self.accumulator.push_instant(score);
        let session_score = self.accumulator.current_score();
        let chime_events = self.chime.update(session_score, score, now);

        let mut events = Vec::new();
        for event in chime_events {
            self.route_chime(event, now, &mut events);
        }
        events
    }

    /// Poll timers and drain coaching reports.
    pub fn tick(&mut self) -> Vec<PipelineEvent> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();

        if let Some(eval) = self.accumulator.tick(now) {
            if eval.score_changed {
                events.push(PipelineEvent::ScoreChanged {
                    time_ms: eval.time_ms,
                    score: eval.score,
                });
            }
            let smoothed = self.ema.rounded().unwrap_or(self.last_instant);
            if let Some(event) = self.orchestrator.observe_score(smoothed) {
                events.push(PipelineEvent::Coaching(event));
            }
        }

        if let Some(event) = self.chime.poll(now) {
            self.route_chime(event, now, &mut events);
        }

        events.extend(
            self.orchestrator
                .poll(now)
                .into_iter()
                .map(PipelineEvent::Coaching),
        );

        let session_score = self.accumulator.current_score();
        if self.recorder.poll(session_score, now) {
            if let Some(snapshot) = self.recorder.state().snapshots.last() {
                events.push(PipelineEvent::Snapshot(*snapshot));
            }
        }

        events
    }

    fn route_chime(&mut self, event: ChimeEvent, now: i64, events: &mut Vec<PipelineEvent>) {
        let count = match event {
            ChimeEvent::AlertStarted => {
                self.recorder.record_distraction();
                None
            }
            ChimeEvent::Chime { count } => Some(count),
            ChimeEvent::AlertStopped { .. } => Some(0),
        };
        events.push(PipelineEvent::Chime(event));

        if let Some(count) = count {
            let score = self.accumulator.current_score();
            if let Some(coaching) = self.orchestrator.on_chime_count(count, score, now) {
                events.push(PipelineEvent::Coaching(coaching));
            }
        }
    }

    fn stop_alert(&mut self, now: i64) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        if let Some(event) = self.chime.stop() {
            self.route_chime(event, now, &mut events);
        }
        events
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    pub fn output(&self) -> PipelineOutput {
        let ui = self.orchestrator.ui();
        PipelineOutput {
            phase: self.recorder.phase(),
            instant_score: self.last_instant,
            smoothed_score: self.ema.rounded(),
            session_score: self.accumulator.current_score(),
            history: self.accumulator.history().to_vec(),
            is_calibrated: self.calibrator.is_calibrated(),
            calibration_progress: self.calibrator.progress(),
            animated_progress: self.calibrator.animated_progress(),
            chime_count: self.chime.chime_count(),
            alert_active: self.chime.is_active(),
            nudge_active: ui.is_playing,
            active_tier: ui.current_tier,
            current_message: ui.current_message.clone(),
        }
    }

    pub fn session_score(&self) -> u8 {
        self.accumulator.current_score()
    }

    pub fn phase(&self) -> SessionPhase {
        self.recorder.phase()
    }

    pub fn config(&self) -> &FocusflowConfig {
        &self.config
    }

    pub fn calibrator(&self) -> &GazeCalibrator {
        &self.calibrator
    }

    pub fn accumulator(&self) -> &ScoreAccumulator {
        &self.accumulator
    }

    pub fn chime(&self) -> &ChimeController {
        &self.chime
    }

    pub fn orchestrator(&self) -> &NudgeOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut NudgeOrchestrator {
        &mut self.orchestrator
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }
}
