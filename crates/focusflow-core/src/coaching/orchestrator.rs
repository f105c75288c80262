//! Nudge delivery orchestrator.
//!
//! Decides when a voice nudge fires and runs the delivery as a tokio task so
//! score accumulation and chimes keep ticking while text and audio are
//! fetched. The task reports back over an unbounded channel; every message
//! carries the generation it was spawned under, and [`NudgeOrchestrator::poll`]
//! drops anything from an older generation. That is what keeps a delivery
//! cancelled by [`NudgeOrchestrator::reset`] from touching state afterwards.
//!
//! # Invariants
//! - At most one delivery in flight.
//! - At most one delivery per distraction episode; the latch clears only
//!   when the chime count returns to 0.
//! - Every delivery resolves: text falls back to the phrase bank, audio to
//!   local speech or nothing, and playback is bounded by a safety timeout.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::coaching::cache::{prewarm, AudioCache, PrewarmReport};
use crate::coaching::phrases::{all_phrases, PhrasePicker};
use crate::coaching::services::Collaborators;
use crate::coaching::{CoachingContext, CoachingRequest};
use crate::config::{CoachingConfig, ServicesConfig};
use crate::error::ServiceError;
use crate::nudge::{
    advance_escalation, update_score_history, DenyReason, EscalationTier, NudgePolicy, NudgeState,
};
use crate::timing::Clock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TEXT_SERVICE: &str = "text";
pub const SPEECH_SERVICE: &str = "speech";

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextSource {
    Generated,
    Fallback,
}

/// How (or whether) the nudge was voiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioPath {
    Cached,
    Synthesized,
    LocalSpeech,
    /// Playback never signalled completion and was stopped
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub tier: EscalationTier,
    pub text: String,
    pub text_source: TextSource,
    pub audio: AudioPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachingEvent {
    Blocked { reason: DenyReason },
    Started { tier: EscalationTier },
    TextReady { text: String },
    Completed(DeliveryOutcome),
    EscalationReset,
}

/// Transient state for the coaching UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoachingUi {
    pub is_playing: bool,
    pub current_tier: Option<EscalationTier>,
    pub current_message: Option<String>,
}

#[derive(Debug)]
enum DeliveryEvent {
    TextReady { generation: u64, text: String },
    Completed { generation: u64, outcome: DeliveryOutcome },
}

struct InFlight {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

// ============================================================================
// DELIVERY TASK
// ============================================================================

/// Returns a half-open trial permit on drop unless the call was settled with
/// a recorded success or failure. Covers aborted tasks and non-transient
/// errors alike.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    service: &'static str,
    settled: bool,
}

impl<'a> TrialGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, service: &'static str) -> Self {
        Self {
            breaker,
            service,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_trial(self.service);
        }
    }
}

/// Everything one delivery needs, moved into its task.
struct DeliveryJob {
    generation: u64,
    request: CoachingRequest,
    fallback_text: &'static str,
    services: Collaborators,
    cache: AudioCache,
    breaker: Arc<CircuitBreaker>,
    request_timeout: Duration,
    playback_timeout: Duration,
}

impl DeliveryJob {
    async fn run(self, tx: mpsc::UnboundedSender<DeliveryEvent>) {
        let (text, text_source) = self.resolve_text().await;
        log::info!("Nudge text ({}): {}", self.request.tier, text);
        // Receiver gone means the orchestrator was dropped; nothing to report to.
        let _ = tx.send(DeliveryEvent::TextReady {
            generation: self.generation,
            text: text.clone(),
        });

        let audio = self.voice(&text).await;
        let _ = tx.send(DeliveryEvent::Completed {
            generation: self.generation,
            outcome: DeliveryOutcome {
                tier: self.request.tier,
                text,
                text_source,
                audio,
            },
        });
    }

    async fn resolve_text(&self) -> (String, TextSource) {
        let fallback = (self.fallback_text.to_string(), TextSource::Fallback);

        if self.breaker.is_open(TEXT_SERVICE) {
            log::debug!("Text circuit open, using fallback phrase");
            return fallback;
        }
        let mut trial = TrialGuard::new(&self.breaker, TEXT_SERVICE);

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.services.text.generate(&self.request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                elapsed_ms: self.request_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => {
                trial.settle();
                self.breaker.record_success(TEXT_SERVICE);
                (text.trim().to_string(), TextSource::Generated)
            }
            Ok(_) => {
                log::warn!("{} returned empty text, using fallback", self.services.text.name());
                trial.settle();
                self.breaker.record_failure(TEXT_SERVICE);
                fallback
            }
            Err(e) => {
                log::warn!("{} failed: {}, using fallback", self.services.text.name(), e);
                if e.is_transient() {
                    trial.settle();
                    self.breaker.record_failure(TEXT_SERVICE);
                }
                fallback
            }
        }
    }

    async fn fetch_audio(&self, text: &str) -> Option<(Arc<[u8]>, AudioPath)> {
        if let Some(audio) = self.cache.get(text) {
            log::debug!("Audio cache hit for {:?}", text);
            return Some((audio, AudioPath::Cached));
        }

        if self.breaker.is_open(SPEECH_SERVICE) {
            log::debug!("Speech circuit open, skipping synthesis");
            return None;
        }
        let mut trial = TrialGuard::new(&self.breaker, SPEECH_SERVICE);

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.services.speech.synthesize(text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                elapsed_ms: self.request_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(audio) if !audio.is_empty() => {
                trial.settle();
                self.breaker.record_success(SPEECH_SERVICE);
                let audio: Arc<[u8]> = audio.into();
                self.cache.set(text, Arc::clone(&audio));
                Some((audio, AudioPath::Synthesized))
            }
            Ok(_) => {
                log::warn!("{} returned empty audio", self.services.speech.name());
                trial.settle();
                self.breaker.record_failure(SPEECH_SERVICE);
                None
            }
            Err(e) => {
                log::warn!("{} failed: {}", self.services.speech.name(), e);
                if e.is_transient() {
                    trial.settle();
                    self.breaker.record_failure(SPEECH_SERVICE);
                }
                None
            }
        }
    }

    async fn voice(&self, text: &str) -> AudioPath {
        if let Some((audio, path)) = self.fetch_audio(text).await {
            match tokio::time::timeout(self.playback_timeout, self.services.player.play(audio.to_vec()))
                .await
            {
                Ok(Ok(())) => return path,
                Ok(Err(e)) => {
                    log::warn!("Audio playback failed: {}, falling back to local speech", e);
                }
                Err(_) => {
                    log::warn!(
                        "Audio playback safety timeout ({}ms), forcing resolve",
                        self.playback_timeout.as_millis()
                    );
                    self.services.player.stop();
                    return AudioPath::TimedOut;
                }
            }
        }

        let local = &self.services.local_speech;
        if !local.is_available() {
            log::warn!("Local speech not available, skipping audio");
            return AudioPath::Skipped;
        }

        match tokio::time::timeout(self.playback_timeout, local.speak(text)).await {
            Ok(Ok(())) => AudioPath::LocalSpeech,
            Ok(Err(e)) => {
                log::warn!("Local speech failed: {}", e);
                AudioPath::Skipped
            }
            Err(_) => {
                log::warn!(
                    "Local speech safety timeout ({}ms), forcing resolve",
                    self.playback_timeout.as_millis()
                );
                local.cancel();
                AudioPath::TimedOut
            }
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct NudgeOrchestrator {
    config: CoachingConfig,
    policy: NudgePolicy,
    services: Collaborators,
    cache: AudioCache,
    breaker: Arc<CircuitBreaker>,
    picker: PhrasePicker,
    request_timeout: Duration,

    nudge_state: Option<NudgeState>,
    in_flight: Option<InFlight>,
    generation: u64,
    episode_triggered: bool,
    previous_chime_count: u32,
    ui: CoachingUi,

    events_tx: mpsc::UnboundedSender<DeliveryEvent>,
    events_rx: mpsc::UnboundedReceiver<DeliveryEvent>,
    prewarm_handle: Option<JoinHandle<PrewarmReport>>,
}

impl std::fmt::Debug for NudgeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NudgeOrchestrator")
            .field("nudge_state", &self.nudge_state)
            .field("in_flight", &self.in_flight.is_some())
            .field("generation", &self.generation)
            .field("episode_triggered", &self.episode_triggered)
            .field("ui", &self.ui)
            .finish()
    }
}

impl NudgeOrchestrator {
    pub fn new(
        config: CoachingConfig,
        services_config: &ServicesConfig,
        services: Collaborators,
        cache: AudioCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::from(services_config),
            clock,
        ));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            policy: NudgePolicy::from(&config),
            picker: PhrasePicker::new(config.rng_seed),
            request_timeout: Duration::from_millis(services_config.request_timeout_ms.max(1)),
            config,
            services,
            cache,
            breaker,
            nudge_state: None,
            in_flight: None,
            generation: 0,
            episode_triggered: false,
            previous_chime_count: 0,
            ui: CoachingUi::default(),
            events_tx,
            events_rx,
            prewarm_handle: None,
        }
    }

    /// Begin a new session with a fresh nudge state, and kick off the
    /// phrase-bank pre-warm when enabled.
    pub fn start_session(&mut self, now_ms: i64) {
        if self.in_flight.is_some() {
            self.reset();
        }
        if self.nudge_state.is_some() {
            log::debug!("Discarding nudge state from the previous session");
        }
        self.nudge_state = Some(NudgeState::new(now_ms));
        log::info!("Nudge state initialized for session");
        if self.config.prewarm_on_start {
            self.spawn_prewarm();
        }
    }

    /// Fire-and-forget synthesis of the fallback phrases not yet cached.
    pub fn spawn_prewarm(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No tokio runtime, skipping audio pre-warm");
            return;
        };
        if let Some(previous) = self.prewarm_handle.take() {
            previous.abort();
        }
        log::info!("Session started, firing pre-cache warm-up");
        self.prewarm_handle = Some(runtime.spawn(prewarm(
            self.cache.clone(),
            Arc::clone(&self.services.speech),
            all_phrases(),
            self.config.prewarm_batch_size,
        )));
    }

    /// Hand over the pre-warm task so a caller can await its report.
    pub fn take_prewarm_handle(&mut self) -> Option<JoinHandle<PrewarmReport>> {
        self.prewarm_handle.take()
    }

    /// Track a score for recovery detection; resets escalation after
    /// sustained focus.
    pub fn observe_score(&mut self, score: u8) -> Option<CoachingEvent> {
        let state = self.nudge_state.as_mut()?;
        *state = update_score_history(state, score);

        if state.escalation_level > 0 && self.policy.should_reset_escalation(state) {
            log::info!("Sustained high focus detected, resetting escalation");
            *state = state.with_escalation_reset();
            return Some(CoachingEvent::EscalationReset);
        }
        None
    }

    /// React to the chime controller's count. Starts a delivery when the
    /// activation threshold is reached and every gate passes.
    pub fn on_chime_count(&mut self, chime_count: u32, current_score: u8, now_ms: i64) -> Option<CoachingEvent> {
        let state = self.nudge_state.as_ref()?;

        if chime_count == 0 && self.previous_chime_count > 0 {
            log::debug!("Chime count reset, user recovered focus");
            self.episode_triggered = false;
        }
        self.previous_chime_count = chime_count;

        if chime_count < self.config.chimes_to_activate
            || self.episode_triggered
            || self.in_flight.is_some()
        {
            return None;
        }

        let decision = self.policy.can_trigger_nudge(state, current_score, now_ms);
        if let Some(reason) = decision.reason {
            log::debug!("Nudge blocked: {}", reason);
            return Some(CoachingEvent::Blocked { reason });
        }

        let tier = if self.config.enable_escalation {
            state.tier()
        } else {
            EscalationTier::Gentle
        };
        let context = CoachingContext {
            session_minutes: ((now_ms - state.session_start_time).max(0) / 60_000) as u32,
            distraction_count: state.consecutive_distractions,
        };

        log::info!("Chime threshold reached, triggering {} voice nudge", tier);
        self.episode_triggered = true;
        self.generation += 1;
        self.ui = CoachingUi {
            is_playing: true,
            current_tier: Some(tier),
            current_message: None,
        };

        let job = DeliveryJob {
            generation: self.generation,
            request: CoachingRequest { tier, context },
            fallback_text: self.picker.pick(tier),
            services: self.services.clone(),
            cache: self.cache.clone(),
            breaker: Arc::clone(&self.breaker),
            request_timeout: self.request_timeout,
            playback_timeout: Duration::from_millis(self.config.playback_timeout_ms),
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(job.run(self.events_tx.clone()))),
            Err(_) => {
                // No runtime to run the collaborators on: deliver the fallback silently.
                log::warn!("No tokio runtime, delivering fallback text without audio");
                let _ = self.events_tx.send(DeliveryEvent::Completed {
                    generation: job.generation,
                    outcome: DeliveryOutcome {
                        tier,
                        text: job.fallback_text.to_string(),
                        text_source: TextSource::Fallback,
                        audio: AudioPath::Skipped,
                    },
                });
                None
            }
        };
        self.in_flight = Some(InFlight {
            generation: self.generation,
            handle,
        });

        Some(CoachingEvent::Started { tier })
    }

    /// Drain delivery reports. A completion stamps `last_nudge_time = now_ms`
    /// and advances escalation.
    pub fn poll(&mut self, now_ms: i64) -> Vec<CoachingEvent> {
        let mut events = Vec::new();

        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                DeliveryEvent::TextReady { generation, text } => {
                    if generation != self.generation || self.in_flight.is_none() {
                        continue;
                    }
                    self.ui.current_message = Some(text.clone());
                    events.push(CoachingEvent::TextReady { text });
                }
                DeliveryEvent::Completed {
                    generation,
                    outcome,
                } => {
                    let current = self
                        .in_flight
                        .as_ref()
                        .map(|f| f.generation == generation)
                        .unwrap_or(false);
                    if !current {
                        log::debug!("Dropping stale delivery report (generation {})", generation);
                        continue;
                    }

                    self.in_flight = None;
                    self.ui = CoachingUi::default();
                    if let Some(state) = self.nudge_state.as_mut() {
                        *state = advance_escalation(&state.with_last_nudge_time(now_ms));
                    }
                    log::info!("Nudge complete ({:?} text, {:?} audio)", outcome.text_source, outcome.audio);
                    events.push(CoachingEvent::Completed(outcome));
                }
            }
        }

        events
    }

    /// Abort any in-flight delivery, silence audio and clear UI state.
    /// Escalation history is kept.
    pub fn reset(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            if let Some(handle) = in_flight.handle {
                handle.abort();
            }
            log::debug!("Cancelled in-flight delivery (generation {})", in_flight.generation);
        }
        self.services.player.stop();
        self.services.local_speech.cancel();

        self.generation += 1;
        while self.events_rx.try_recv().is_ok() {}

        self.episode_triggered = false;
        self.previous_chime_count = 0;
        self.ui = CoachingUi::default();
    }

    /// [`reset`](Self::reset) plus dropping the nudge state; the next
    /// [`start_session`](Self::start_session) starts a fresh grace period.
    pub fn reset_session(&mut self) {
        self.reset();
        self.nudge_state = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn ui(&self) -> &CoachingUi {
        &self.ui
    }

    pub fn nudge_state(&self) -> Option<&NudgeState> {
        self.nudge_state.as_ref()
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Drop for NudgeOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take().and_then(|f| f.handle) {
            handle.abort();
        }
    }
}
