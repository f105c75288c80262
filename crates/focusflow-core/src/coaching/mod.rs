//! Voice coaching: collaborator contracts, fallbacks and nudge delivery.
//!
//! # Architecture
//!
//! ```text
//! chime count ──► NudgeOrchestrator ──► delivery task (tokio)
//!                        │                 │ TextGenerator ─┐ fallback: PhrasePicker
//!                        │                 │ AudioCache ────┤
//!                        │                 │ SpeechService ─┤ fallback: LocalSpeech
//!                        │                 │ AudioPlayer ───┘ bounded by playback timeout
//!                        ◄──── mpsc ───────┘ DeliveryEvent (generation-tagged)
//! ```
//!
//! # Feature Flags
//!
//! - `http-services`: Gemini text generation and ElevenLabs speech over `ureq`.

pub mod cache;
#[cfg(feature = "http-services")]
pub mod http;
pub mod mock;
pub mod orchestrator;
pub mod phrases;
pub mod services;

pub use cache::{prewarm, AudioCache, PrewarmReport};
#[cfg(feature = "http-services")]
pub use http::{ElevenLabsSpeech, GeminiTextGenerator};
pub use orchestrator::{
    AudioPath, CoachingEvent, CoachingUi, DeliveryOutcome, NudgeOrchestrator, TextSource,
};
pub use phrases::{PhrasePicker, FALLBACK_PHRASES};
pub use services::{AudioPlayer, Collaborators, LocalSpeech, SpeechService, TextGenerator};

use crate::nudge::EscalationTier;
use serde::{Deserialize, Serialize};

/// Lightweight session context sent with every text request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingContext {
    pub session_minutes: u32,
    pub distraction_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingRequest {
    pub tier: EscalationTier,
    pub context: CoachingContext,
}

impl CoachingRequest {
    /// User-turn prompt for text generators.
    pub fn prompt(&self) -> String {
        format!(
            "Generate a focus coaching nudge. User has been in session for {} minutes with {} distractions.",
            self.context.session_minutes, self.context.distraction_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_lowercase_tier() {
        let request = CoachingRequest {
            tier: EscalationTier::Medium,
            context: CoachingContext {
                session_minutes: 12,
                distraction_count: 2,
            },
        };
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json["tier"], "medium");
        assert_eq!(json["context"]["session_minutes"], 12);
        assert!(request.prompt().contains("12 minutes with 2 distractions"));
    }
}
