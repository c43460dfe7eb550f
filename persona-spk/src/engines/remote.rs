//! HTTP inference service engines
//!
//! Wire protocol (JSON over HTTP):
//! - `POST {endpoint}/v1/synthesize` `{text, voice, language, model, sample_rate, channels}`
//!   -> `{"audio": "<base64 pcm_s16le>"}`
//! - `POST {endpoint}/v1/recognize` `{audio, sample_rate, channels, model}` -> `{"text": "..."}`
//! - `GET {endpoint}/health` -> any 2xx

use crate::config::VoiceConfig;
use crate::engines::{AsrEngine, TtsEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use persona_core::AudioFormat;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

const MAX_AUDIO_SIZE: usize = 10 * 1024 * 1024;

/// Shared HTTP plumbing for both engine kinds
struct RemoteClient {
    name: String,
    client: Client,
    base: Url,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    audio: String,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
}

impl RemoteClient {
    fn new(name: &str, endpoint: &str, api_key: Option<String>, model: Option<String>) -> Result<Self, SpeechError> {
        // Timeouts are enforced by the adapter around each call
        let client = Client::builder()
            .build()
            .map_err(|e| SpeechError::Config(format!("Failed to create HTTP client: {}", e)))?;

        // Trailing slash so relative joins stay under any base path
        let base = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))
            .map_err(|e| SpeechError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        Ok(Self {
            name: name.to_string(),
            client,
            base,
            api_key: api_key.or_else(|| std::env::var("PERSONA_ENGINE_API_KEY").ok()),
            model,
        })
    }

    fn url(&self, path: &str) -> Result<Url, SpeechError> {
        self.base
            .join(path)
            .map_err(|e| SpeechError::engine(&self.name, format!("bad url: {}", e)))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, SpeechError> {
        let mut request = self.client.post(self.url(path)?).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SpeechError::engine(&self.name, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SpeechError::engine(
                &self.name,
                format!("service error ({}): {}", status, error_text),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SpeechError::engine(&self.name, format!("invalid response: {}", e)))
    }

    async fn health(&self) -> Result<(), SpeechError> {
        let response = self
            .client
            .get(self.url("health")?)
            .send()
            .await
            .map_err(|e| SpeechError::engine(&self.name, format!("health request failed: {}", e)))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SpeechError::engine(&self.name, format!("health status {}", response.status())))
        }
    }
}

/// Synthesis over HTTP
pub struct RemoteTtsEngine {
    inner: RemoteClient,
    format: AudioFormat,
}

impl RemoteTtsEngine {
    pub fn new(
        name: &str,
        endpoint: &str,
        api_key: Option<String>,
        model: Option<String>,
        format: AudioFormat,
    ) -> Result<Self, SpeechError> {
        Ok(Self {
            inner: RemoteClient::new(name, endpoint, api_key, model)?,
            format,
        })
    }
}

#[async_trait]
impl TtsEngine for RemoteTtsEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Bytes, SpeechError> {
        let body = json!({
            "text": text,
            "voice": voice.name,
            "language": voice.language,
            "model": self.inner.model,
            "sample_rate": self.format.sample_rate,
            "channels": self.format.channels,
        });

        let response: SynthesizeResponse = self.inner.post_json("v1/synthesize", body).await?;
        let audio = general_purpose::STANDARD
            .decode(response.audio.as_bytes())
            .map_err(|e| SpeechError::engine(&self.inner.name, format!("bad base64 audio: {}", e)))?;

        if audio.len() > MAX_AUDIO_SIZE {
            return Err(SpeechError::engine(
                &self.inner.name,
                format!("audio too large ({} bytes)", audio.len()),
            ));
        }
        if audio.len() % self.format.frame_bytes() != 0 {
            return Err(SpeechError::engine(&self.inner.name, "audio is not whole PCM frames"));
        }

        debug!("{} synthesized {} bytes", self.inner.name, audio.len());
        Ok(Bytes::from(audio))
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        self.inner.health().await
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

/// Recognition over HTTP
pub struct RemoteAsrEngine {
    inner: RemoteClient,
}

impl RemoteAsrEngine {
    pub fn new(name: &str, endpoint: &str, api_key: Option<String>, model: Option<String>) -> Result<Self, SpeechError> {
        Ok(Self {
            inner: RemoteClient::new(name, endpoint, api_key, model)?,
        })
    }
}

#[async_trait]
impl AsrEngine for RemoteAsrEngine {
    async fn recognize(&self, audio: &[u8], format: &AudioFormat) -> Result<String, SpeechError> {
        let body = json!({
            "audio": general_purpose::STANDARD.encode(audio),
            "sample_rate": format.sample_rate,
            "channels": format.channels,
            "model": self.inner.model,
        });
        let response: RecognizeResponse = self.inner.post_json("v1/recognize", body).await?;
        Ok(response.text)
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        self.inner.health().await
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}
