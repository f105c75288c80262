//! HTTP collaborators: Gemini text generation and ElevenLabs speech.
//!
//! Both use blocking `ureq` calls moved onto tokio's blocking pool, so they
//! never stall the runtime that drives the pipeline.
//!
//! # Example
//! ```rust,ignore
//! use focusflow_core::coaching::http::{GeminiTextGenerator, ElevenLabsSpeech};
//! use focusflow_core::config::ServicesConfig;
//!
//! let services = ServicesConfig::default();
//! let text = GeminiTextGenerator::from_env(&services);
//! let speech = ElevenLabsSpeech::from_env(&services);
//! ```

use crate::coaching::phrases::system_instruction;
use crate::coaching::services::{SpeechService, TextGenerator};
use crate::coaching::CoachingRequest;
use crate::config::ServicesConfig;
use crate::error::ServiceError;
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const ELEVENLABS_API_KEY_VAR: &str = "ELEVENLABS_API_KEY";

/// Cap on a single synthesized clip.
const MAX_AUDIO_BYTES: u64 = 8 * 1024 * 1024;

fn map_ureq_error(e: ureq::Error, timeout: Duration) -> ServiceError {
    match e {
        ureq::Error::Status(status, resp) => ServiceError::Http {
            status,
            body: resp.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => {
            let msg = t.to_string();
            if msg.contains("timeout") || msg.contains("timed out") {
                ServiceError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                }
            } else {
                ServiceError::Transport(msg)
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Transport(format!("blocking task failed: {}", e)))?
}

// ============================================================================
// GEMINI
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiTextGenerator {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiTextGenerator {
    pub fn new(config: &ServicesConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.text_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.text_model.clone(),
            temperature: config.text_temperature,
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`; a missing key is reported per call.
    pub fn from_env(config: &ServicesConfig) -> Self {
        Self::new(config, std::env::var(GEMINI_API_KEY_VAR).ok())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(&self, request: &CoachingRequest) -> serde_json::Value {
        serde_json::json!({
            "systemInstruction": {
                "parts": [{ "text": system_instruction(request.tier) }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt() }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
            },
        })
    }
}

/// First candidate's concatenated text parts.
fn extract_gemini_text(json: &serde_json::Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Some(text)
}

#[async_trait]
impl TextGenerator for GeminiTextGenerator {
    async fn generate(&self, request: &CoachingRequest) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::NotConfigured(GEMINI_API_KEY_VAR.to_string()))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.request_body(request);
        let timeout = self.timeout;

        run_blocking(move || {
            let response = ureq::post(&url)
                .timeout(timeout)
                .set("x-goog-api-key", &api_key)
                .set("Content-Type", "application/json")
                .send_json(&body)
                .map_err(|e| map_ureq_error(e, timeout))?;

            let json: serde_json::Value = response
                .into_json()
                .map_err(|e| ServiceError::Transport(e.to_string()))?;

            let text = extract_gemini_text(&json).unwrap_or_default();
            let text = text.trim();
            if text.is_empty() {
                Err(ServiceError::EmptyResponse)
            } else {
                Ok(text.to_string())
            }
        })
        .await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ============================================================================
// ELEVENLABS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ElevenLabsSpeech {
    base_url: String,
    api_key: Option<String>,
    voice_id: String,
    model_id: String,
    timeout: Duration,
}

impl ElevenLabsSpeech {
    pub fn new(config: &ServicesConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.speech_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            voice_id: config.speech_voice_id.clone(),
            model_id: config.speech_model_id.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Reads the key from `ELEVENLABS_API_KEY`.
    pub fn from_env(config: &ServicesConfig) -> Self {
        Self::new(config, std::env::var(ELEVENLABS_API_KEY_VAR).ok())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl SpeechService for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::NotConfigured(ELEVENLABS_API_KEY_VAR.to_string()))?;
        let url = format!("{}/text-to-speech/{}", self.base_url, self.voice_id);
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            },
        });
        let timeout = self.timeout;

        run_blocking(move || {
            let response = ureq::post(&url)
                .timeout(timeout)
                .set("xi-api-key", &api_key)
                .set("Content-Type", "application/json")
                .set("Accept", "audio/mpeg")
                .send_json(&body)
                .map_err(|e| map_ureq_error(e, timeout))?;

            let mut audio = Vec::new();
            response
                .into_reader()
                .take(MAX_AUDIO_BYTES)
                .read_to_end(&mut audio)
                .map_err(|e| ServiceError::Transport(e.to_string()))?;

            if audio.is_empty() {
                Err(ServiceError::EmptyResponse)
            } else {
                Ok(audio)
            }
        })
        .await
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}
