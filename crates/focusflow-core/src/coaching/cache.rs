//! Synthesized audio cache and the session-start pre-warm.
//!
//! The cache is keyed by the exact spoken text. It is unbounded: the corpus
//! is the fixed phrase bank plus the occasional generated nudge.

use crate::coaching::services::SpeechService;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Shared text → audio map. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct AudioCache {
    entries: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<Arc<[u8]>> {
        self.entries.read().get(text).cloned()
    }

    pub fn set(&self, text: impl Into<String>, audio: impl Into<Arc<[u8]>>) {
        self.entries.write().insert(text.into(), audio.into());
    }

    pub fn has(&self, text: &str) -> bool {
        self.entries.read().contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrewarmReport {
    /// Newly synthesized and stored
    pub cached: usize,
    /// Already present before the run
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

/// Synthesize every phrase not yet cached, `batch_size` requests at a time.
///
/// Failures are logged and counted; they never abort the run.
pub async fn prewarm<I, S>(
    cache: AudioCache,
    speech: Arc<dyn SpeechService>,
    phrases: I,
    batch_size: usize,
) -> PrewarmReport
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let phrases: Vec<String> = phrases.into_iter().map(Into::into).collect();
    let mut report = PrewarmReport {
        total: phrases.len(),
        ..Default::default()
    };

    let pending: Vec<String> = phrases
        .into_iter()
        .filter(|p| {
            let hit = cache.has(p);
            if hit {
                report.skipped += 1;
            }
            !hit
        })
        .collect();

    for batch in pending.chunks(batch_size.max(1)) {
        let mut set = JoinSet::new();
        for text in batch {
            let speech = Arc::clone(&speech);
            let text = text.clone();
            set.spawn(async move {
                let result = speech.synthesize(&text).await;
                (text, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((text, Ok(audio))) if !audio.is_empty() => {
                    cache.set(text, audio);
                    report.cached += 1;
                }
                Ok((text, Ok(_))) => {
                    log::warn!("Pre-warm got empty audio for {:?}", text);
                    report.failed += 1;
                }
                Ok((text, Err(e))) => {
                    log::warn!("Pre-warm failed for {:?}: {}", text, e);
                    report.failed += 1;
                }
                Err(e) => {
                    log::warn!("Pre-warm task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }
    }

    log::info!(
        "Pre-warm complete: {} cached, {} skipped, {} failed of {}",
        report.cached,
        report.skipped,
        report.failed,
        report.total
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::mock::MockSpeechService;
    use crate::error::ServiceError;

    #[test]
    fn test_cache_get_set_has() {
        let cache = AudioCache::new();
        assert!(!cache.has("hello"));
        cache.set("hello", vec![1u8, 2, 3]);

        let shared = cache.clone();
        assert!(shared.has("hello"));
        assert_eq!(shared.get("hello").as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_prewarm_skips_cached() {
        let cache = AudioCache::new();
        cache.set("one", vec![1u8]);
        let speech = Arc::new(MockSpeechService::new());

        let report = prewarm(cache.clone(), speech.clone(), ["one", "two", "three"], 2).await;

        assert_eq!(
            report,
            PrewarmReport {
                cached: 2,
                skipped: 1,
                failed: 0,
                total: 3
            }
        );
        assert_eq!(speech.call_count(), 2);
        assert!(cache.has("three"));
    }

    #[tokio::test]
    async fn test_prewarm_counts_failures() {
        let cache = AudioCache::new();
        let speech = Arc::new(MockSpeechService::new());
        speech.simulate_error(ServiceError::Http {
            status: 401,
            body: "bad key".into(),
        });

        let report = prewarm(cache.clone(), speech, ["a", "b", "c"], 2).await;
        assert_eq!(report.failed, 3);
        assert_eq!(report.cached, 0);
        assert!(cache.is_empty());
    }
}
