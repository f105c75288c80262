//! Mock collaborators for tests and the demo CLI.
//!
//! Each mock supports:
//! - Simulated errors
//! - Artificial latency (driven by tokio time, so paused-clock tests work)
//! - Call counters and recorded inputs
//!
//! Players and local speech can also be told to hang forever, which is how
//! the playback safety timeout is exercised.

use crate::coaching::services::{AudioPlayer, LocalSpeech, SpeechService, TextGenerator};
use crate::coaching::CoachingRequest;
use crate::error::ServiceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

async fn simulate_latency(delay_ms: u64) {
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

// ============================================================================
// TEXT
// ============================================================================

#[derive(Debug)]
pub struct MockTextGenerator {
    response: RwLock<String>,
    simulate_error: RwLock<Option<ServiceError>>,
    delay_ms: RwLock<u64>,
    requests: RwLock<Vec<CoachingRequest>>,
    call_count: AtomicUsize,
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::with_response("Mock nudge. Focus now.")
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: RwLock::new(response.into()),
            simulate_error: RwLock::new(None),
            delay_ms: RwLock::new(0),
            requests: RwLock::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        let mock = Self::new();
        mock.simulate_error(error);
        mock
    }

    pub fn set_response(&self, response: impl Into<String>) {
        *self.response.write() = response.into();
    }

    pub fn simulate_error(&self, error: ServiceError) {
        *self.simulate_error.write() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.simulate_error.write() = None;
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        *self.delay_ms.write() = delay_ms;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CoachingRequest> {
        self.requests.read().clone()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, request: &CoachingRequest) -> Result<String, ServiceError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().push(*request);

        let delay = *self.delay_ms.read();
        simulate_latency(delay).await;

        if let Some(error) = self.simulate_error.read().clone() {
            return Err(error);
        }
        Ok(self.response.read().clone())
    }

    fn name(&self) -> &'static str {
        "mock-text"
    }
}

// ============================================================================
// SPEECH
// ============================================================================

/// Returns the UTF-8 bytes of the text as "audio".
#[derive(Debug, Default)]
pub struct MockSpeechService {
    simulate_error: RwLock<Option<ServiceError>>,
    delay_ms: RwLock<u64>,
    call_count: AtomicUsize,
}

impl MockSpeechService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: ServiceError) -> Self {
        let mock = Self::new();
        mock.simulate_error(error);
        mock
    }

    pub fn simulate_error(&self, error: ServiceError) {
        *self.simulate_error.write() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.simulate_error.write() = None;
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        *self.delay_ms.write() = delay_ms;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechService for MockSpeechService {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay_ms.read();
        simulate_latency(delay).await;

        if let Some(error) = self.simulate_error.read().clone() {
            return Err(error);
        }
        Ok(text.as_bytes().to_vec())
    }

    fn name(&self) -> &'static str {
        "mock-speech"
    }
}

// ============================================================================
// PLAYBACK
// ============================================================================

#[derive(Debug, Default)]
pub struct MockAudioPlayer {
    played: RwLock<Vec<Vec<u8>>>,
    simulate_error: RwLock<Option<ServiceError>>,
    duration_ms: RwLock<u64>,
    hang: AtomicBool,
    stop_count: AtomicUsize,
}

impl MockAudioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A player whose playback never signals completion.
    pub fn hanging() -> Self {
        let mock = Self::new();
        mock.hang.store(true, Ordering::SeqCst);
        mock
    }

    pub fn simulate_error(&self, error: ServiceError) {
        *self.simulate_error.write() = Some(error);
    }

    pub fn set_duration_ms(&self, duration_ms: u64) {
        *self.duration_ms.write() = duration_ms;
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.read().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for MockAudioPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<(), ServiceError> {
        if let Some(error) = self.simulate_error.read().clone() {
            return Err(error);
        }
        self.played.write().push(audio);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let duration = *self.duration_ms.read();
        simulate_latency(duration).await;
        Ok(())
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// LOCAL SPEECH
// ============================================================================

#[derive(Debug)]
pub struct MockLocalSpeech {
    available: AtomicBool,
    hang: AtomicBool,
    simulate_error: RwLock<Option<ServiceError>>,
    spoken: RwLock<Vec<String>>,
    cancel_count: AtomicUsize,
}

impl Default for MockLocalSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLocalSpeech {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            simulate_error: RwLock::new(None),
            spoken: RwLock::new(Vec::new()),
            cancel_count: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        let mock = Self::new();
        mock.set_available(false);
        mock
    }

    pub fn hanging() -> Self {
        let mock = Self::new();
        mock.hang.store(true, Ordering::SeqCst);
        mock
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn simulate_error(&self, error: ServiceError) {
        *self.simulate_error.write() = Some(error);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.read().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalSpeech for MockLocalSpeech {
    async fn speak(&self, text: &str) -> Result<(), ServiceError> {
        if !self.is_available() {
            return Err(ServiceError::Unavailable("local speech disabled".to_string()));
        }
        if let Some(error) = self.simulate_error.read().clone() {
            return Err(error);
        }
        self.spoken.write().push(text.to_string());

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TESTS
// ============================================================================
