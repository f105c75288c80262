//! Local phrase bank and seeded phrase selection.

use crate::nudge::EscalationTier;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Fallback nudges per tier; also the corpus synthesized during pre-warm.
pub const FALLBACK_PHRASES: [(EscalationTier, &[&str]); 3] = [
    (
        EscalationTier::Gentle,
        &[
            "Hey, let's refocus on your task.",
            "Come back and focus.",
            "Your attention is drifting a little.",
            "Time to return your focus.",
            "Let's get back on track.",
            "A gentle reminder to refocus.",
            "Bring your attention back here.",
            "Time to refocus on your work.",
            "Let's ease back into focus.",
        ],
    ),
    (
        EscalationTier::Medium,
        &[
            "You're losing focus. Bring it back.",
            "Focus is slipping. Time to re-engage.",
            "Your mind is wandering. Snap back.",
            "Let's regain that focus you had.",
            "Attention needed. Come back now.",
            "Your focus dropped. Let's fix that.",
            "Stay with your work. Refocus now.",
            "Bring that attention back to work.",
            "Re-engage with your task now.",
        ],
    ),
    (
        EscalationTier::Direct,
        &[
            "Stop getting distracted. Focus now.",
            "You need to concentrate. Get working.",
            "Focus up. Your attention is needed.",
            "Enough distractions. Time to focus.",
            "No more delays. Focus immediately.",
            "Stop. Get back to work now.",
            "Distractions end now. Focus up.",
            "Lock in. Focus on your task.",
            "Quit drifting. Concentrate right now.",
        ],
    ),
];

pub fn phrases_for(tier: EscalationTier) -> &'static [&'static str] {
    FALLBACK_PHRASES
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, phrases)| *phrases)
        .unwrap_or(&[])
}

/// Every phrase in the bank, gentle first.
pub fn all_phrases() -> impl Iterator<Item = &'static str> {
    FALLBACK_PHRASES
        .iter()
        .flat_map(|(_, phrases)| phrases.iter().copied())
}

/// System instruction for remote text generation at a given tier.
pub fn system_instruction(tier: EscalationTier) -> &'static str {
    match tier {
        EscalationTier::Gentle => {
            "You are a supportive focus coach. Generate a single gentle reminder to refocus. \
             MUST be 4-8 words. No quotes or punctuation except periods. \
             Examples: \"Hey, let's get back on track.\" \"Time to refocus on your work.\" \
             \"Your attention drifted a little.\" Never use harsh language."
        }
        EscalationTier::Medium => {
            "You are a firm but caring focus coach. Generate a single nudge to regain focus. \
             MUST be 4-8 words. Be direct but not harsh. No quotes or punctuation except periods. \
             Examples: \"Your focus is slipping, come back.\" \"Let's bring that attention back now.\" \
             \"Time to re-engage with your task.\""
        }
        EscalationTier::Direct => {
            "You are a no-nonsense focus coach. Generate a single direct command to focus immediately. \
             MUST be 4-8 words. Be assertive. No quotes or punctuation except periods. \
             Examples: \"Stop. Focus. Right now.\" \"Enough distractions, get to work.\" \
             \"Focus up. No more delays.\""
        }
    }
}

/// Picks fallback phrases from a seedable RNG.
#[derive(Debug, Clone)]
pub struct PhrasePicker {
    rng: StdRng,
}

impl PhrasePicker {
    /// `None` seeds from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn pick(&mut self, tier: EscalationTier) -> &'static str {
        phrases_for(tier)
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("Time to refocus.")
    }
}
