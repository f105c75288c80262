//! Property-based checks for the scoring and alert invariants.

use proptest::prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{ScoreAccumulator, INITIAL_SCORE};
    use crate::chime::ChimeController;
    use crate::config::{AccumulatorConfig, ChimeConfig, ScoringConfig};
    use crate::nudge::{
        advance_escalation, update_score_history, NudgeState, MAX_ESCALATION_LEVEL,
    };
    use crate::scoring::instant_score;
    use crate::signal::NormalizedSignal;

    // =========================================================================
    // Session score never rises
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_session_score_non_increasing(
            scores in prop::collection::vec(0u8..=100, 1..400),
            frame_gap in 50i64..400,
        ) {
            let mut acc = ScoreAccumulator::new(AccumulatorConfig::default(), 0);
            let mut previous = acc.current_score();
            let mut now = 0;

            for score in scores {
                now += frame_gap;
                acc.push_instant(score);
                if let Some(eval) = acc.tick(now) {
                    prop_assert!(eval.score <= previous);
                    previous = eval.score;
                }
            }
            prop_assert!(acc.current_score() <= INITIAL_SCORE);
            prop_assert!(acc.history().len() <= AccumulatorConfig::default().history_capacity);
        }
    }

    // =========================================================================
    // Chime count is zero whenever no alert is active
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_chime_count_zero_when_inactive(
            steps in prop::collection::vec((0u8..=100, 0u8..=100), 1..300),
        ) {
            let mut chime = ChimeController::new(ChimeConfig::default(), 0);
            let mut now = 0;
            let mut session = 100u8;

            for (drop, instant) in steps {
                now += 250;
                session = session.saturating_sub(drop % 3);
                chime.update(session, instant, now);
                chime.poll(now);
                if !chime.is_active() {
                    prop_assert_eq!(chime.chime_count(), 0);
                }
            }
        }
    }

    // =========================================================================
    // Instant score is total and bounded
    // =========================================================================
    proptest! {
        #[test]
        fn test_instant_score_bounded(
            yaw in prop::num::f32::ANY,
            pitch in prop::num::f32::ANY,
            dev in prop::num::f32::ANY,
            conf in 0.0f32..=1.0,
            present in any::<bool>(),
        ) {
            let signal = NormalizedSignal {
                yaw_deg: yaw,
                pitch_deg: pitch,
                gaze_deviation_deg: dev,
                gaze_confidence: conf,
                face_present: present,
            };
            let score = instant_score(&signal, &ScoringConfig::default());
            prop_assert!(score <= 100);
            if !present {
                prop_assert_eq!(score, 0);
            }
            prop_assert_eq!(score, instant_score(&signal, &ScoringConfig::default()));
        }
    }

    // =========================================================================
    // Escalation stays within its ladder
    // =========================================================================
    proptest! {
        #[test]
        fn test_escalation_level_bounded(
            ops in prop::collection::vec(prop_oneof![Just(None), (0u8..=100).prop_map(Some)], 0..100),
        ) {
            let mut state = NudgeState::new(0);
            for op in ops {
                state = match op {
                    None => advance_escalation(&state),
                    Some(score) => update_score_history(&state, score),
                };
                prop_assert!(state.escalation_level <= MAX_ESCALATION_LEVEL);
                prop_assert!(state.score_history.len() <= 5);
            }
        }
    }
}
