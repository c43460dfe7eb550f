//! Closure-backed engines
//! Lets callers plug any synthesis or recognition function into the adapter

use crate::config::VoiceConfig;
use crate::engines::{AsrEngine, TtsEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use persona_core::AudioFormat;
use std::sync::Arc;

type SynthesizeFn =
    Arc<dyn Fn(String, VoiceConfig) -> BoxFuture<'static, Result<Bytes, SpeechError>> + Send + Sync>;
type RecognizeFn =
    Arc<dyn Fn(Bytes, AudioFormat) -> BoxFuture<'static, Result<String, SpeechError>> + Send + Sync>;
type HealthFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Custom synthesis engine wrapper
pub struct CustomTtsEngine {
    name: String,
    synthesize_fn: SynthesizeFn,
    health_fn: HealthFn,
}

impl CustomTtsEngine {
    /// Create from a synchronous function
    pub fn new<F>(name: impl Into<String>, synthesize_fn: F) -> Self
    where
        F: Fn(&str, &VoiceConfig) -> Result<Bytes, SpeechError> + Send + Sync + 'static,
    {
        let synthesize_fn = Arc::new(synthesize_fn);
        Self {
            name: name.into(),
            synthesize_fn: Arc::new(move |text: String, voice: VoiceConfig| -> BoxFuture<'static, Result<Bytes, SpeechError>> {
                let result = synthesize_fn(&text, &voice);
                Box::pin(async move { result })
            }),
            health_fn: Arc::new(|| true),
        }
    }

    /// Create from an async function
    pub fn from_async<F>(name: impl Into<String>, synthesize_fn: F) -> Self
    where
        F: Fn(String, VoiceConfig) -> BoxFuture<'static, Result<Bytes, SpeechError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            synthesize_fn: Arc::new(synthesize_fn),
            health_fn: Arc::new(|| true),
        }
    }

    /// Replace the health check used by the probe
    pub fn with_health<F>(mut self, health_fn: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.health_fn = Arc::new(health_fn);
        self
    }
}

#[async_trait]
impl TtsEngine for CustomTtsEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Bytes, SpeechError> {
        (self.synthesize_fn)(text.to_string(), voice.clone()).await
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        if (self.health_fn)() {
            Ok(())
        } else {
            Err(SpeechError::engine(&self.name, "health check failed"))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Custom recognition engine wrapper
pub struct CustomAsrEngine {
    name: String,
    recognize_fn: RecognizeFn,
    health_fn: HealthFn,
}

impl CustomAsrEngine {
    pub fn new<F>(name: impl Into<String>, recognize_fn: F) -> Self
    where
        F: Fn(&[u8], &AudioFormat) -> Result<String, SpeechError> + Send + Sync + 'static,
    {
        let recognize_fn = Arc::new(recognize_fn);
        Self {
            name: name.into(),
            recognize_fn: Arc::new(move |audio: Bytes, format: AudioFormat| -> BoxFuture<'static, Result<String, SpeechError>> {
                let result = recognize_fn(&audio, &format);
                Box::pin(async move { result })
            }),
            health_fn: Arc::new(|| true),
        }
    }

    pub fn from_async<F>(name: impl Into<String>, recognize_fn: F) -> Self
    where
        F: Fn(Bytes, AudioFormat) -> BoxFuture<'static, Result<String, SpeechError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            recognize_fn: Arc::new(recognize_fn),
            health_fn: Arc::new(|| true),
        }
    }

    pub fn with_health<F>(mut self, health_fn: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.health_fn = Arc::new(health_fn);
        self
    }
}

#[async_trait]
impl AsrEngine for CustomAsrEngine {
    async fn recognize(&self, audio: &[u8], format: &AudioFormat) -> Result<String, SpeechError> {
        (self.recognize_fn)(Bytes::copy_from_slice(audio), *format).await
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        if (self.health_fn)() {
            Ok(())
        } else {
            Err(SpeechError::engine(&self.name, "health check failed"))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
