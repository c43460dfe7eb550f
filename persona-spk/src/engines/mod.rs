//! Speech engine implementations

pub mod custom;
pub mod piper;
pub mod remote;
pub mod tone;

use crate::config::{EngineBackend, EngineSpec, VoiceConfig};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use persona_core::AudioFormat;
use std::sync::Arc;

/// Trait for synthesis engines.
///
/// Implementations return raw PCM in the adapter's `AudioFormat`.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize text to speech audio
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Bytes, SpeechError>;

    /// Lightweight liveness check used by the health probe
    async fn health_check(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    /// Get engine name
    fn name(&self) -> &str;
}

/// Trait for recognition engines
#[async_trait]
pub trait AsrEngine: Send + Sync {
    /// Transcribe raw PCM audio
    async fn recognize(&self, audio: &[u8], format: &AudioFormat) -> Result<String, SpeechError>;

    async fn health_check(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Build a synthesis engine from its configuration
pub fn build_tts(spec: &EngineSpec, format: AudioFormat) -> Result<Arc<dyn TtsEngine>, SpeechError> {
    spec.validate().map_err(SpeechError::Config)?;
    match &spec.backend {
        EngineBackend::Remote { endpoint, api_key, model } => Ok(Arc::new(
            remote::RemoteTtsEngine::new(&spec.name, endpoint, api_key.clone(), model.clone(), format)?,
        )),
        EngineBackend::Piper { executable, model_path } => Ok(Arc::new(
            piper::PiperTtsEngine::new(&spec.name, executable.clone(), model_path.clone(), format)?,
        )),
        EngineBackend::Tone { ms_per_char } => {
            Ok(Arc::new(tone::ToneTtsEngine::new(&spec.name, *ms_per_char, format)))
        }
    }
}

/// Build a recognition engine from its configuration
pub fn build_asr(spec: &EngineSpec) -> Result<Arc<dyn AsrEngine>, SpeechError> {
    spec.validate().map_err(SpeechError::Config)?;
    match &spec.backend {
        EngineBackend::Remote { endpoint, api_key, model } => Ok(Arc::new(
            remote::RemoteAsrEngine::new(&spec.name, endpoint, api_key.clone(), model.clone())?,
        )),
        other => Err(SpeechError::Config(format!(
            "Engine '{}': backend {:?} cannot do recognition",
            spec.name, other
        ))),
    }
}
