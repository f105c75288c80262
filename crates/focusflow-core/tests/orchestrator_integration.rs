//! Delivery orchestration against mock collaborators on a paused tokio clock.

use focusflow_core::coaching::mock::{
    MockAudioPlayer, MockLocalSpeech, MockSpeechService, MockTextGenerator,
};
use focusflow_core::coaching::phrases::phrases_for;
use focusflow_core::config::{CoachingConfig, ServicesConfig};
use focusflow_core::{
    AudioCache, AudioPath, CircuitState, CoachingEvent, Collaborators, DeliveryOutcome,
    DenyReason, EscalationTier, ManualClock, NudgeOrchestrator, ServiceError, TextSource,
};
use std::sync::Arc;
use std::time::Duration;

const AFTER_GRACE: i64 = 61_000;

struct Harness {
    orch: NudgeOrchestrator,
    text: Arc<MockTextGenerator>,
    speech: Arc<MockSpeechService>,
    player: Arc<MockAudioPlayer>,
    local: Arc<MockLocalSpeech>,
    cache: AudioCache,
    clock: ManualClock,
}

fn harness_with(
    text: MockTextGenerator,
    speech: MockSpeechService,
    player: MockAudioPlayer,
    local: MockLocalSpeech,
    config: CoachingConfig,
) -> Harness {
    let text = Arc::new(text);
    let speech = Arc::new(speech);
    let player = Arc::new(player);
    let local = Arc::new(local);
    let cache = AudioCache::new();
    let clock = ManualClock::new(0);
    let orch = NudgeOrchestrator::new(
        config,
        &ServicesConfig::default(),
        Collaborators::new(text.clone(), speech.clone(), player.clone(), local.clone()),
        cache.clone(),
        Arc::new(clock.clone()),
    );
    Harness {
        orch,
        text,
        speech,
        player,
        local,
        cache,
        clock,
    }
}

fn quiet_config() -> CoachingConfig {
    CoachingConfig {
        prewarm_on_start: false,
        rng_seed: Some(11),
        ..Default::default()
    }
}

fn harness() -> Harness {
    harness_with(
        MockTextGenerator::new(),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    )
}

/// Let delivery tasks run (auto-advancing paused time) until a completion shows up.
async fn run_until_complete(orch: &mut NudgeOrchestrator, now_ms: i64) -> Vec<CoachingEvent> {
    let mut events = Vec::new();
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let batch = orch.poll(now_ms);
        let done = batch
            .iter()
            .any(|e| matches!(e, CoachingEvent::Completed(_)));
        events.extend(batch);
        if done {
            break;
        }
    }
    events
}

fn outcome(events: &[CoachingEvent]) -> DeliveryOutcome {
    events
        .iter()
        .find_map(|e| match e {
            CoachingEvent::Completed(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .expect("delivery never completed")
}

#[tokio::test(start_paused = true)]
async fn test_generated_text_and_synthesized_audio() {
    let mut h = harness();
    h.orch.start_session(0);

    assert_eq!(
        h.orch.on_chime_count(5, 40, AFTER_GRACE),
        Some(CoachingEvent::Started {
            tier: EscalationTier::Gentle
        })
    );
    assert!(h.orch.is_in_flight());
    assert!(h.orch.ui().is_playing);

    let events = run_until_complete(&mut h.orch, AFTER_GRACE).await;
    assert!(events.contains(&CoachingEvent::TextReady {
        text: "Mock nudge. Focus now.".into()
    }));

    let done = outcome(&events);
    assert_eq!(done.text_source, TextSource::Generated);
    assert_eq!(done.audio, AudioPath::Synthesized);
    assert_eq!(h.player.played(), vec![b"Mock nudge. Focus now.".to_vec()]);
    assert!(h.cache.has("Mock nudge. Focus now."));

    let state = h.orch.nudge_state().unwrap();
    assert_eq!(state.escalation_level, 1);
    assert_eq!(state.consecutive_distractions, 1);
    assert_eq!(state.last_nudge_time, Some(AFTER_GRACE));
    assert!(!h.orch.is_in_flight());
    assert_eq!(*h.orch.ui(), Default::default());

    let request = h.text.requests()[0];
    assert_eq!(request.context.session_minutes, 1);
    assert_eq!(request.context.distraction_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_text_failure_uses_tier_phrase() {
    let mut h = harness_with(
        MockTextGenerator::failing(ServiceError::Http {
            status: 500,
            body: "boom".into(),
        }),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.text_source, TextSource::Fallback);
    assert!(!done.text.is_empty());
    assert!(phrases_for(EscalationTier::Gentle).contains(&done.text.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_text_uses_fallback() {
    let mut h = harness_with(
        MockTextGenerator::with_response("   \n"),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.text_source, TextSource::Fallback);
    assert!(phrases_for(EscalationTier::Gentle).contains(&done.text.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_speech_failure_falls_back_to_local_speech() {
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::failing(ServiceError::Transport("dns".into())),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.audio, AudioPath::LocalSpeech);
    assert_eq!(h.local.spoken(), vec!["Mock nudge. Focus now.".to_string()]);
    assert!(h.player.played().is_empty());
    assert!(h.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_audio_anywhere_still_completes() {
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::failing(ServiceError::NotConfigured("ELEVENLABS_API_KEY".into())),
        MockAudioPlayer::new(),
        MockLocalSpeech::unavailable(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.audio, AudioPath::Skipped);
    assert_eq!(h.orch.nudge_state().unwrap().escalation_level, 1);
}

#[tokio::test(start_paused = true)]
async fn test_playback_error_falls_back_to_local_speech() {
    let player = MockAudioPlayer::new();
    player.simulate_error(ServiceError::Playback("decoder".into()));
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::new(),
        player,
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.audio, AudioPath::LocalSpeech);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_playback_is_force_resolved() {
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::new(),
        MockAudioPlayer::hanging(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let started = tokio::time::Instant::now();
    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);

    assert_eq!(done.audio, AudioPath::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(10_000));
    assert_eq!(h.player.stop_count(), 1);
    assert!(h.local.spoken().is_empty());
    assert!(!h.orch.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_local_speech_is_cancelled() {
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::failing(ServiceError::Timeout { elapsed_ms: 10_000 }),
        MockAudioPlayer::new(),
        MockLocalSpeech::hanging(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);

    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.audio, AudioPath::TimedOut);
    assert_eq!(h.local.cancel_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_in_flight_delivery() {
    let text = MockTextGenerator::new();
    text.set_delay_ms(5_000);
    let mut h = harness_with(
        text,
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);
    h.orch.on_chime_count(5, 40, AFTER_GRACE);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(h.orch.is_in_flight());

    h.orch.reset();
    assert!(!h.orch.is_in_flight());
    assert_eq!(*h.orch.ui(), Default::default());
    assert_eq!(h.player.stop_count(), 1);
    assert_eq!(h.local.cancel_count(), 1);

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert!(h.orch.poll(90_000).is_empty());

    let state = h.orch.nudge_state().unwrap();
    assert_eq!(state.escalation_level, 0);
    assert_eq!(state.last_nudge_time, None);
    assert!(h.player.played().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_one_nudge_per_episode_then_escalates() {
    let mut h = harness();
    h.orch.start_session(0);

    h.orch.on_chime_count(5, 40, AFTER_GRACE);
    run_until_complete(&mut h.orch, AFTER_GRACE).await;

    // Same episode keeps chiming: no second nudge even after the cooldown.
    for count in 6..12 {
        assert_eq!(h.orch.on_chime_count(count, 30, 200_000), None);
    }

    // Recovery, then a fresh episode inside the cooldown.
    h.orch.on_chime_count(0, 60, 70_000);
    assert_eq!(
        h.orch.on_chime_count(5, 40, 80_000),
        Some(CoachingEvent::Blocked {
            reason: DenyReason::Cooldown
        })
    );

    // Next episode after the cooldown gets the medium tier.
    h.orch.on_chime_count(0, 60, 100_000);
    assert_eq!(
        h.orch.on_chime_count(5, 40, 120_000),
        Some(CoachingEvent::Started {
            tier: EscalationTier::Medium
        })
    );
    let done = outcome(&run_until_complete(&mut h.orch, 120_000).await);
    assert_eq!(done.tier, EscalationTier::Medium);
    assert_eq!(h.orch.nudge_state().unwrap().escalation_level, 2);
}

#[tokio::test(start_paused = true)]
async fn test_escalation_disabled_stays_gentle() {
    let mut h = harness_with(
        MockTextGenerator::new(),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        CoachingConfig {
            enable_escalation: false,
            ..quiet_config()
        },
    );
    h.orch.start_session(0);

    let mut now = AFTER_GRACE;
    for _ in 0..3 {
        h.orch.on_chime_count(0, 60, now);
        assert_eq!(
            h.orch.on_chime_count(5, 40, now),
            Some(CoachingEvent::Started {
                tier: EscalationTier::Gentle
            })
        );
        run_until_complete(&mut h.orch, now).await;
        now += 40_000;
    }
    assert_eq!(h.orch.nudge_state().unwrap().escalation_level, 2);
}

#[tokio::test(start_paused = true)]
async fn test_text_circuit_opens_after_repeated_failures() {
    let mut h = harness_with(
        MockTextGenerator::failing(ServiceError::Transport("connection reset".into())),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        quiet_config(),
    );
    h.orch.start_session(0);

    let mut now = AFTER_GRACE;
    for _ in 0..4 {
        h.orch.on_chime_count(0, 60, now);
        h.orch.on_chime_count(5, 40, now);
        let done = outcome(&run_until_complete(&mut h.orch, now).await);
        assert_eq!(done.text_source, TextSource::Fallback);
        now += 40_000;
    }

    assert_eq!(h.text.call_count(), 3);
    assert!(matches!(
        h.orch.breaker().state("text"),
        Some(CircuitState::Open { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_prewarm_fills_cache_and_serves_fallback() {
    let mut h = harness_with(
        MockTextGenerator::failing(ServiceError::EmptyResponse),
        MockSpeechService::new(),
        MockAudioPlayer::new(),
        MockLocalSpeech::new(),
        CoachingConfig {
            prewarm_on_start: true,
            ..quiet_config()
        },
    );
    h.orch.start_session(0);
    let report = h.orch.take_prewarm_handle().unwrap().await.unwrap();
    assert_eq!(report.total, 27);
    assert_eq!(report.cached, 27);
    assert_eq!(h.speech.call_count(), 27);

    h.orch.on_chime_count(5, 40, AFTER_GRACE);
    let done = outcome(&run_until_complete(&mut h.orch, AFTER_GRACE).await);
    assert_eq!(done.audio, AudioPath::Cached);
    assert_eq!(h.speech.call_count(), 27);
}

/// Three transient failures open the text circuit; returns the next free `now`.
async fn open_text_circuit(h: &mut Harness) -> i64 {
    h.text.simulate_error(ServiceError::Transport("connection reset".into()));
    let mut now = AFTER_GRACE;
    for _ in 0..3 {
        h.orch.on_chime_count(0, 60, now);
        h.orch.on_chime_count(5, 40, now);
        run_until_complete(&mut h.orch, now).await;
        now += 40_000;
    }
    assert!(matches!(
        h.orch.breaker().state("text"),
        Some(CircuitState::Open { .. })
    ));
    now
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_survives_non_transient_error() {
    let mut h = harness();
    h.orch.start_session(0);
    let now = open_text_circuit(&mut h).await;

    h.clock.advance(30_000);
    h.text.simulate_error(ServiceError::NotConfigured("missing api key".into()));
    h.orch.on_chime_count(0, 60, now);
    h.orch.on_chime_count(5, 40, now);
    let done = outcome(&run_until_complete(&mut h.orch, now).await);
    assert_eq!(done.text_source, TextSource::Fallback);
    assert_eq!(h.text.call_count(), 4);
    assert!(matches!(
        h.orch.breaker().state("text"),
        Some(CircuitState::HalfOpen { trial_permits: 1, .. })
    ));

    h.text.clear_error();
    let now = now + 40_000;
    h.orch.on_chime_count(0, 60, now);
    h.orch.on_chime_count(5, 40, now);
    let done = outcome(&run_until_complete(&mut h.orch, now).await);
    assert_eq!(done.text_source, TextSource::Generated);
    assert_eq!(
        h.orch.breaker().state("text"),
        Some(CircuitState::Closed { failures: 0 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_trial_returns_permit() {
    let mut h = harness();
    h.orch.start_session(0);
    let now = open_text_circuit(&mut h).await;

    h.clock.advance(30_000);
    h.text.clear_error();
    h.text.set_delay_ms(5_000);
    h.orch.on_chime_count(0, 60, now);
    h.orch.on_chime_count(5, 40, now);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.text.call_count(), 4);

    h.orch.reset();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        h.orch.breaker().state("text"),
        Some(CircuitState::HalfOpen { trial_permits: 1, .. })
    ));

    h.text.set_delay_ms(0);
    h.orch.on_chime_count(5, 40, now);
    let done = outcome(&run_until_complete(&mut h.orch, now).await);
    assert_eq!(done.text_source, TextSource::Generated);
    assert_eq!(h.text.call_count(), 5);
}
