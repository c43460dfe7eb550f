//! Engine adapter
//!
//! One instance per process, shared by every session. Holds the registered
//! synthesis and recognition engines in priority order, routes each call to
//! the first selectable engine and falls through to the next on failure or
//! timeout. Health records are the only state shared across sessions; they
//! are updated right after each call, never while one is in flight.

use crate::cache::SynthesisCache;
use crate::config::{AdapterConfig, SpeechConfig, VoiceConfig};
use crate::engines::{self, AsrEngine, TtsEngine};
use crate::error::SpeechError;
use crate::health::{EngineHealth, EngineHealthSnapshot, EngineKind, HealthPolicy, HealthStatus};
use bytes::Bytes;
use metrics::{counter, histogram};
use persona_core::AudioFormat;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest text accepted for a single synthesis call
const MAX_TEXT_BYTES: usize = 100_000;
/// Largest recognition payload (about five minutes of 16 kHz mono)
const MAX_RECOGNITION_BYTES: usize = 10 * 1024 * 1024;

struct Registered<E: ?Sized> {
    name: String,
    priority: u32,
    engine: Arc<E>,
    health: EngineHealth,
}

impl<E: ?Sized> Registered<E> {
    fn new(name: String, priority: u32, engine: Arc<E>) -> Self {
        Self {
            name,
            priority,
            engine,
            health: EngineHealth::new(),
        }
    }
}

pub struct EngineAdapter {
    tts: Vec<Registered<dyn TtsEngine>>,
    asr: Vec<Registered<dyn AsrEngine>>,
    config: AdapterConfig,
    policy: HealthPolicy,
    format: AudioFormat,
    permits: Arc<Semaphore>,
    cache: Option<SynthesisCache>,
}

/// Builder for `EngineAdapter`
pub struct EngineAdapterBuilder {
    tts: Vec<(u32, Arc<dyn TtsEngine>)>,
    asr: Vec<(u32, Arc<dyn AsrEngine>)>,
    config: AdapterConfig,
    format: AudioFormat,
}

impl EngineAdapterBuilder {
    pub fn new() -> Self {
        Self {
            tts: Vec::new(),
            asr: Vec::new(),
            config: AdapterConfig::default(),
            format: AudioFormat::default(),
        }
    }

    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Register a synthesis engine; lower `priority` is tried first
    pub fn with_tts(mut self, engine: Arc<dyn TtsEngine>, priority: u32) -> Self {
        self.tts.push((priority, engine));
        self
    }

    /// Register a recognition engine; lower `priority` is tried first
    pub fn with_asr(mut self, engine: Arc<dyn AsrEngine>, priority: u32) -> Self {
        self.asr.push((priority, engine));
        self
    }

    pub fn build(self) -> Result<EngineAdapter, SpeechError> {
        self.config.validate().map_err(SpeechError::Config)?;

        let mut names = std::collections::HashSet::new();
        for name in self
            .tts
            .iter()
            .map(|(_, e)| e.name().to_string())
            .chain(self.asr.iter().map(|(_, e)| e.name().to_string()))
        {
            if !names.insert(name.clone()) {
                return Err(SpeechError::Config(format!("Duplicate engine name '{}'", name)));
            }
        }

        // Stable sort keeps registration order among equal priorities
        let mut tts: Vec<_> = self
            .tts
            .into_iter()
            .map(|(p, e)| Registered::new(e.name().to_string(), p, e))
            .collect();
        tts.sort_by_key(|r| r.priority);
        let mut asr: Vec<_> = self
            .asr
            .into_iter()
            .map(|(p, e)| Registered::new(e.name().to_string(), p, e))
            .collect();
        asr.sort_by_key(|r| r.priority);

        let cache = self
            .config
            .enable_cache
            .then(|| SynthesisCache::new(self.config.max_cache_size_mb));

        info!(
            "Engine adapter ready: tts=[{}] asr=[{}]",
            tts.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", "),
            asr.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", "),
        );

        Ok(EngineAdapter {
            tts,
            asr,
            policy: HealthPolicy::from_config(&self.config),
            permits: Arc::new(Semaphore::new(self.config.global_max_in_flight)),
            config: self.config,
            format: self.format,
            cache,
        })
    }
}

impl Default for EngineAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineAdapter {
    pub fn builder() -> EngineAdapterBuilder {
        EngineAdapterBuilder::new()
    }

    /// Build every configured engine and register it
    pub fn from_config(config: &SpeechConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Config)?;

        let mut builder = Self::builder().config(config.adapter.clone()).format(config.format);
        for spec in &config.tts_engines {
            builder = builder.with_tts(engines::build_tts(spec, config.format)?, spec.priority);
        }
        for spec in &config.asr_engines {
            builder = builder.with_asr(engines::build_asr(spec)?, spec.priority);
        }
        builder.build()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn has_recognition(&self) -> bool {
        !self.asr.is_empty()
    }

    /// Synthesize `text` with the first healthy engine, falling back in priority order
    pub async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Bytes, SpeechError> {
        validate_text(text)?;
        voice.validate().map_err(SpeechError::InvalidInput)?;

        let cache_key = self.cache.as_ref().map(|_| SynthesisCache::key(text, voice));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(audio) = cache.get(key) {
                return Ok(audio);
            }
        }

        let started = Instant::now();
        let audio = self
            .call_with_fallback(
                EngineKind::Synthesis,
                &self.tts,
                self.config.synthesis_timeout(),
                |engine: Arc<dyn TtsEngine>| async move { engine.synthesize(text, voice).await },
            )
            .await?;
        histogram!("persona_synthesis_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, audio.clone());
        }
        Ok(audio)
    }

    /// Transcribe PCM in the adapter's format
    pub async fn recognize(&self, audio: &[u8], format: &AudioFormat) -> Result<String, SpeechError> {
        if audio.is_empty() {
            return Err(SpeechError::InvalidInput("Audio cannot be empty".to_string()));
        }
        if audio.len() > MAX_RECOGNITION_BYTES {
            return Err(SpeechError::InvalidInput(format!(
                "Audio too large ({} bytes, max {})",
                audio.len(),
                MAX_RECOGNITION_BYTES
            )));
        }
        if audio.len() % format.frame_bytes() != 0 {
            return Err(SpeechError::InvalidInput("Audio is not whole PCM frames".to_string()));
        }

        self.call_with_fallback(
            EngineKind::Recognition,
            &self.asr,
            self.config.recognition_timeout(),
            |engine: Arc<dyn AsrEngine>| async move { engine.recognize(audio, format).await },
        )
        .await
    }

    async fn call_with_fallback<E, T, F, Fut>(
        &self,
        kind: EngineKind,
        engines: &[Registered<E>],
        timeout: Duration,
        mut call: F,
    ) -> Result<T, SpeechError>
    where
        E: ?Sized,
        F: FnMut(Arc<E>) -> Fut,
        Fut: Future<Output = Result<T, SpeechError>>,
    {
        if engines.is_empty() {
            return Err(SpeechError::NoEngines(kind_label(kind).to_string()));
        }

        let mut attempted = Vec::new();
        for registered in engines {
            if !registered.health.is_selectable(Instant::now(), self.policy.cooldown) {
                debug!("Skipping {} engine '{}' ({:?})", kind_label(kind), registered.name, registered.health.status());
                continue;
            }

            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| SpeechError::Cancelled)?;
            attempted.push(registered.name.clone());

            let outcome = match tokio::time::timeout(timeout, call(registered.engine.clone())).await {
                Ok(result) => result,
                Err(_) => Err(SpeechError::Timeout {
                    engine: registered.name.clone(),
                    after: timeout,
                }),
            };

            match outcome {
                Ok(value) => {
                    registered.health.record_success();
                    return Ok(value);
                }
                // Bad input fails the same way on every engine
                Err(SpeechError::InvalidInput(msg)) => return Err(SpeechError::InvalidInput(msg)),
                Err(e) => {
                    let status = registered.health.record_failure(&self.policy, &e.to_string());
                    counter!("persona_engine_failures_total", "engine" => registered.name.clone()).increment(1);
                    warn!(
                        "{} engine '{}' failed ({:?} now): {}",
                        kind_label(kind),
                        registered.name,
                        status,
                        e
                    );
                }
            }
        }

        counter!("persona_engine_exhausted_total").increment(1);
        error!("All {} engines failed or were skipped (attempted: {:?})", kind_label(kind), attempted);
        Err(SpeechError::EngineExhausted { attempted })
    }

    /// Health-check every engine that is currently skipped.
    ///
    /// Unavailable engines, and degraded engines whose cooldown has elapsed,
    /// return to `Available` when their check passes. Returns how many recovered.
    pub async fn probe(&self) -> usize {
        let now = Instant::now();
        let mut recovered = 0;

        for registered in &self.tts {
            if needs_probe(&registered.health, now, self.policy.cooldown) {
                let check = tokio::time::timeout(self.config.synthesis_timeout(), registered.engine.health_check()).await;
                if matches!(check, Ok(Ok(()))) {
                    info!("Synthesis engine '{}' recovered", registered.name);
                    registered.health.mark_available();
                    recovered += 1;
                }
            }
        }
        for registered in &self.asr {
            if needs_probe(&registered.health, now, self.policy.cooldown) {
                let check = tokio::time::timeout(self.config.recognition_timeout(), registered.engine.health_check()).await;
                if matches!(check, Ok(Ok(()))) {
                    info!("Recognition engine '{}' recovered", registered.name);
                    registered.health.mark_available();
                    recovered += 1;
                }
            }
        }
        recovered
    }

    /// Run `probe` every `probe_interval` until `shutdown` fires
    pub fn spawn_health_probe(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let period = self.config.probe_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let recovered = self.probe().await;
                        if recovered > 0 {
                            debug!("Health probe recovered {} engines", recovered);
                        }
                    }
                }
            }
            debug!("Health probe stopped");
        })
    }

    /// Manual override: put an engine back into rotation. Returns false for unknown names.
    pub fn mark_available(&self, name: &str) -> bool {
        let health = self
            .tts
            .iter()
            .find_map(|r| r.health_with_name(name))
            .or_else(|| self.asr.iter().find_map(|r| r.health_with_name(name)));
        match health {
            Some(health) => {
                health.mark_available();
                info!("Engine '{}' marked available", name);
                true
            }
            None => false,
        }
    }

    pub fn health_report(&self) -> Vec<EngineHealthSnapshot> {
        self.tts
            .iter()
            .map(|r| r.health.snapshot(&r.name, EngineKind::Synthesis, r.priority))
            .chain(
                self.asr
                    .iter()
                    .map(|r| r.health.snapshot(&r.name, EngineKind::Recognition, r.priority)),
            )
            .collect()
    }

    /// True when at least one synthesis engine is not unavailable
    pub fn is_healthy(&self) -> bool {
        self.tts
            .iter()
            .any(|r| r.health.status() != HealthStatus::Unavailable)
    }

    pub fn cached_bytes(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.size_bytes())
    }
}

impl<E: ?Sized> Registered<E> {
    fn health_with_name(&self, name: &str) -> Option<&EngineHealth> {
        (self.name == name).then_some(&self.health)
    }
}

fn needs_probe(health: &EngineHealth, now: Instant, cooldown: Duration) -> bool {
    match health.status() {
        HealthStatus::Available => false,
        HealthStatus::Unavailable => true,
        HealthStatus::Degraded => health.is_selectable(now, cooldown),
    }
}

fn kind_label(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Synthesis => "synthesis",
        EngineKind::Recognition => "recognition",
    }
}

fn validate_text(text: &str) -> Result<(), SpeechError> {
    if text.trim().is_empty() {
        return Err(SpeechError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.len() > MAX_TEXT_BYTES {
        return Err(SpeechError::InvalidInput(format!(
            "Text too long ({} bytes, max {})",
            text.len(),
            MAX_TEXT_BYTES
        )));
    }
    if text.contains('\0') {
        return Err(SpeechError::InvalidInput("Text contains null bytes".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::custom::CustomTtsEngine;

    fn fixed(name: &str, payload: &'static [u8]) -> Arc<dyn TtsEngine> {
        Arc::new(CustomTtsEngine::new(name, move |_: &str, _: &VoiceConfig| Ok(Bytes::from_static(payload))))
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = EngineAdapter::builder()
            .with_tts(fixed("a", b"xx"), 0)
            .with_tts(fixed("a", b"yy"), 1)
            .build();
        assert!(matches!(result, Err(SpeechError::Config(_))));
    }

    #[tokio::test]
    async fn test_priority_order_respected() {
        let adapter = EngineAdapter::builder()
            .with_tts(fixed("low", b"lo"), 10)
            .with_tts(fixed("high", b"hi"), 1)
            .build()
            .unwrap();
        let audio = adapter.synthesize("hello", &VoiceConfig::default()).await.unwrap();
        assert_eq!(&audio[..], b"hi");
    }

    #[tokio::test]
    async fn test_invalid_input_not_counted_against_engine() {
        let adapter = EngineAdapter::builder().with_tts(fixed("a", b"xx"), 0).build().unwrap();
        assert!(matches!(
            adapter.synthesize("bad\0text", &VoiceConfig::default()).await,
            Err(SpeechError::InvalidInput(_))
        ));
        assert!(matches!(
            adapter.synthesize("   ", &VoiceConfig::default()).await,
            Err(SpeechError::InvalidInput(_))
        ));
        assert_eq!(adapter.health_report()[0].total_calls, 0);
    }

    #[tokio::test]
    async fn test_no_recognition_engines() {
        let adapter = EngineAdapter::builder().build().unwrap();
        let err = adapter.recognize(&[0u8; 4], &AudioFormat::default()).await.unwrap_err();
        assert!(matches!(err, SpeechError::NoEngines(_)));
        assert!(!adapter.has_recognition());
    }

    #[tokio::test]
    async fn test_mark_available_unknown_engine() {
        let adapter = EngineAdapter::builder().with_tts(fixed("a", b"xx"), 0).build().unwrap();
        assert!(adapter.mark_available("a"));
        assert!(!adapter.mark_available("missing"));
    }

    #[tokio::test]
    async fn test_from_default_config_uses_tone_engine() {
        let adapter = EngineAdapter::from_config(&SpeechConfig::default()).unwrap();
        let audio = adapter.synthesize("hello there", &VoiceConfig::default()).await.unwrap();
        assert!(!audio.is_empty());
        assert_eq!(adapter.health_report()[0].name, "tone");
    }
}
