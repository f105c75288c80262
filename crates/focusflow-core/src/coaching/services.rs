//! Contracts for the external coaching collaborators.
//!
//! All four are object-safe `async_trait` traits so the orchestrator can hold
//! them as `Arc<dyn _>` and move clones into its delivery tasks.

use crate::coaching::CoachingRequest;
use crate::error::ServiceError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Short coaching text for a tier.
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    async fn generate(&self, request: &CoachingRequest) -> Result<String, ServiceError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Remote text-to-speech producing encoded audio.
#[async_trait]
pub trait SpeechService: Send + Sync + Debug {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;

    fn name(&self) -> &'static str;
}

/// Plays encoded audio. `play` resolves when playback ends.
#[async_trait]
pub trait AudioPlayer: Send + Sync + Debug {
    async fn play(&self, audio: Vec<u8>) -> Result<(), ServiceError>;

    /// Stop whatever is playing, immediately.
    fn stop(&self);
}

/// On-device speech synthesis used when remote audio is unavailable.
#[async_trait]
pub trait LocalSpeech: Send + Sync + Debug {
    /// Resolves when the utterance ends.
    async fn speak(&self, text: &str) -> Result<(), ServiceError>;

    fn cancel(&self);

    fn is_available(&self) -> bool;
}

/// The four collaborators injected into the orchestrator.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechService>,
    pub player: Arc<dyn AudioPlayer>,
    pub local_speech: Arc<dyn LocalSpeech>,
}

impl Collaborators {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechService>,
        player: Arc<dyn AudioPlayer>,
        local_speech: Arc<dyn LocalSpeech>,
    ) -> Self {
        Self {
            text,
            speech,
            player,
            local_speech,
        }
    }
}
