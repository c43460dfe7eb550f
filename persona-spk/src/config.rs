//! Configuration for speech engines, segmentation and scheduling

use persona_core::AudioFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Default voice for synthesis
    pub voice: VoiceConfig,

    /// PCM format every engine produces and consumes
    pub format: AudioFormat,

    /// Engine adapter behavior (timeouts, health thresholds, cache)
    pub adapter: AdapterConfig,

    /// Text segmentation
    pub segmenter: SegmenterConfig,

    /// Per-session synthesis scheduling
    pub scheduler: SchedulerConfig,

    /// Synthesis engines, tried in ascending `priority`
    pub tts_engines: Vec<EngineSpec>,

    /// Recognition engines, tried in ascending `priority`
    pub asr_engines: Vec<EngineSpec>,
}

/// Voice configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Voice identifier (engine specific)
    pub name: Option<String>,

    /// Language code (e.g., "en-US")
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Per-call synthesis timeout in milliseconds
    pub synthesis_timeout_ms: u64,

    /// Per-call recognition timeout in milliseconds
    pub recognition_timeout_ms: u64,

    /// Consecutive failures before an engine is degraded (skipped for the cooldown)
    pub degrade_after: u32,

    /// Consecutive failures before an engine is unavailable (skipped until a probe succeeds)
    pub unavailable_after: u32,

    /// Cooldown for degraded engines in seconds
    pub cooldown_secs: u64,

    /// Interval of the background health probe in seconds
    pub probe_interval_secs: u64,

    /// Process-wide cap on concurrent engine calls across all sessions
    pub global_max_in_flight: usize,

    /// Cache synthesized audio by (voice, text)
    pub enable_cache: bool,

    /// Maximum cache size in MB
    pub max_cache_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Segments shorter than this (in characters) are merged into the next one
    pub min_chars: usize,

    /// Segments longer than this are split at the last word break
    pub max_chars: usize,

    /// Sentence-terminating characters
    pub terminators: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Synthesis calls in flight per session
    pub max_in_flight: usize,

    /// Length of the silence emitted in place of a segment whose synthesis failed
    pub silence_on_failure_ms: u64,
}

/// One configured engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSpec {
    /// Unique name, used in logs and the health report
    pub name: String,

    /// Lower values are tried first
    #[serde(default)]
    pub priority: u32,

    #[serde(flatten)]
    pub backend: EngineBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EngineBackend {
    /// HTTP inference service speaking the JSON protocol in `engines::remote`
    Remote {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Local piper executable producing raw PCM
    Piper {
        #[serde(default)]
        executable: Option<PathBuf>,
        model_path: PathBuf,
    },
    /// Synthetic tone, for running without any inference backend
    Tone {
        #[serde(default = "default_ms_per_char")]
        ms_per_char: u64,
    },
}

fn default_ms_per_char() -> u64 {
    55
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: VoiceConfig::default(),
            format: AudioFormat::default(),
            adapter: AdapterConfig::default(),
            segmenter: SegmenterConfig::default(),
            scheduler: SchedulerConfig::default(),
            tts_engines: vec![EngineSpec {
                name: "tone".to_string(),
                priority: 100,
                backend: EngineBackend::Tone {
                    ms_per_char: default_ms_per_char(),
                },
            }],
            asr_engines: Vec::new(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            name: None,
            language: "en-US".to_string(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            synthesis_timeout_ms: 5_000,
            recognition_timeout_ms: 10_000,
            degrade_after: 3,
            unavailable_after: 10,
            cooldown_secs: 30,
            probe_interval_secs: 15,
            global_max_in_flight: 32,
            enable_cache: true,
            max_cache_size_mb: 64,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_chars: 12,
            max_chars: 200,
            terminators: ".!?;\n。！？；".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            silence_on_failure_ms: 300,
        }
    }
}

impl VoiceConfig {
    /// Validate voice configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.language.is_empty() {
            return Err("Language code cannot be empty".to_string());
        }

        if self.language.len() > 32 {
            return Err("Language code too long (max 32 chars)".to_string());
        }

        if !self.language.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err("Language code contains invalid characters (only alphanumeric and '-' allowed)".to_string());
        }

        if let Some(ref name) = self.name {
            if name.is_empty() {
                return Err("Voice name cannot be empty if provided".to_string());
            }
            if name.len() > 256 {
                return Err("Voice name too long (max 256 chars)".to_string());
            }
            if name.chars().any(|c| c == '\0' || c.is_control()) {
                return Err("Voice name contains invalid characters".to_string());
            }
        }

        Ok(())
    }

    /// Same language, different voice
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            language: self.language.clone(),
        }
    }
}

impl AdapterConfig {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (label, ms) in [
            ("Synthesis timeout", self.synthesis_timeout_ms),
            ("Recognition timeout", self.recognition_timeout_ms),
        ] {
            if ms == 0 {
                return Err(format!("{} must be greater than 0", label));
            }
            if ms > 300_000 {
                return Err(format!("{} too large (max 300000 ms)", label));
            }
        }

        if self.degrade_after == 0 {
            return Err("degrade_after must be at least 1".to_string());
        }

        if self.unavailable_after < self.degrade_after {
            return Err("unavailable_after cannot be smaller than degrade_after".to_string());
        }

        if self.global_max_in_flight == 0 {
            return Err("Global in-flight limit must be greater than 0".to_string());
        }

        if self.global_max_in_flight > 10_000 {
            return Err("Global in-flight limit too large (max 10000)".to_string());
        }

        if self.probe_interval_secs == 0 {
            return Err("Probe interval must be greater than 0".to_string());
        }

        const MAX_CACHE_SIZE_MB: u64 = 10_000;
        if self.max_cache_size_mb > MAX_CACHE_SIZE_MB {
            return Err(format!("Cache size too large (max {} MB)", MAX_CACHE_SIZE_MB));
        }

        Ok(())
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.terminators.is_empty() {
            return Err("At least one sentence terminator is required".to_string());
        }
        if self.terminators.chars().any(|c| c.is_alphanumeric() || c == ' ') {
            return Err("Terminators must be punctuation".to_string());
        }
        if self.max_chars == 0 {
            return Err("max_chars must be greater than 0".to_string());
        }
        if self.min_chars > self.max_chars {
            return Err("min_chars cannot exceed max_chars".to_string());
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn silence_on_failure(&self) -> Duration {
        Duration::from_millis(self.silence_on_failure_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_in_flight == 0 {
            return Err("Scheduler in-flight limit must be greater than 0".to_string());
        }
        if self.max_in_flight > 64 {
            return Err("Scheduler in-flight limit too large (max 64)".to_string());
        }
        if self.silence_on_failure_ms > 10_000 {
            return Err("Failure silence too long (max 10000 ms)".to_string());
        }
        Ok(())
    }
}

impl EngineSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err("Engine name must be 1-64 characters".to_string());
        }
        match &self.backend {
            EngineBackend::Remote { endpoint, .. } => {
                let url = url::Url::parse(endpoint)
                    .map_err(|e| format!("Engine '{}' has an invalid endpoint: {}", self.name, e))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(format!("Engine '{}' endpoint must be http(s)", self.name));
                }
            }
            EngineBackend::Piper { model_path, .. } => {
                if model_path.as_os_str().is_empty() {
                    return Err(format!("Engine '{}' requires model_path", self.name));
                }
            }
            EngineBackend::Tone { ms_per_char } => {
                if *ms_per_char == 0 || *ms_per_char > 1_000 {
                    return Err(format!("Engine '{}' ms_per_char must be 1-1000", self.name));
                }
            }
        }
        Ok(())
    }
}

impl SpeechConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.voice.validate()?;
        self.adapter.validate()?;
        self.segmenter.validate()?;
        self.scheduler.validate()?;

        if self.format.sample_rate < 8_000 || self.format.sample_rate > 48_000 {
            return Err("Sample rate must be between 8000 and 48000 Hz".to_string());
        }
        if self.format.channels == 0 || self.format.channels > 2 {
            return Err("Only mono or stereo audio is supported".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for spec in self.tts_engines.iter().chain(self.asr_engines.iter()) {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("Duplicate engine name '{}'", spec.name));
            }
        }

        Ok(())
    }
}
