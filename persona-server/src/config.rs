//! Process configuration
//!
//! Loaded from a JSON, TOML or YAML file, then overlaid with `PERSONA_*`
//! environment variables. Command line flags are applied last by the binary.

use persona_me::AvatarConfig;
use persona_spk::SpeechConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub server: ServerConfig,
    pub avatar: AvatarConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_sessions: usize,
    /// Sessions without client activity for this long are torn down
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    /// Outbound messages queued per connection before the sender waits
    pub outbound_queue_depth: usize,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_sessions: 256,
            idle_timeout_secs: 300,
            reap_interval_secs: 10,
            outbound_queue_depth: 64,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }
        if self.max_sessions == 0 || self.max_sessions > 100_000 {
            return Err("max_sessions must be between 1 and 100000".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be greater than 0".to_string());
        }
        if self.reap_interval_secs == 0 {
            return Err("reap_interval_secs must be greater than 0".to_string());
        }
        if self.outbound_queue_depth == 0 || self.outbound_queue_depth > 4_096 {
            return Err("outbound_queue_depth must be between 1 and 4096".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl PersonaConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        // Honor the extension when there is one, so errors point at the right format
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            _ => Self::from_str(&content),
        }
    }

    /// Parse configuration of unknown format: JSON, then TOML, then YAML
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<PersonaConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<PersonaConfig>(content) {
            return Ok(config);
        }

        serde_yaml::from_str::<PersonaConfig>(content)
            .map_err(|e| ConfigError::Parse(format!("Unknown format: {}", e)))
    }

    /// Overlay `PERSONA_*` variables from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(std::env::vars());
    }

    /// Overlay `PERSONA_*` variables from `vars`; unparseable values are ignored
    pub fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "PERSONA_HOST" => self.server.host = value,
                "PERSONA_PORT" => set_parsed(&mut self.server.port, &value),
                "PERSONA_MAX_SESSIONS" => set_parsed(&mut self.server.max_sessions, &value),
                "PERSONA_IDLE_TIMEOUT_SECS" => set_parsed(&mut self.server.idle_timeout_secs, &value),
                "PERSONA_LOG_LEVEL" => self.server.log_level = value,
                "PERSONA_FRAME_RATE" => set_parsed(&mut self.avatar.frame_rate, &value),
                "PERSONA_AVATAR_ID" => self.avatar.avatar_id = Some(value),
                "PERSONA_MAX_IN_FLIGHT" => set_parsed(&mut self.speech.scheduler.max_in_flight, &value),
                "PERSONA_MIN_SEGMENT_CHARS" => set_parsed(&mut self.speech.segmenter.min_chars, &value),
                "PERSONA_SYNTHESIS_TIMEOUT_MS" => {
                    set_parsed(&mut self.speech.adapter.synthesis_timeout_ms, &value)
                }
                "PERSONA_VOICE" => self.speech.voice.name = Some(value),
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate().map_err(ConfigError::Validation)?;
        self.speech.validate().map_err(ConfigError::Validation)?;
        self.avatar
            .validate_for(&self.speech.format)
            .map_err(ConfigError::Validation)?;
        Ok(())
    }
}

fn set_parsed<T: std::str::FromStr>(target: &mut T, value: &str) {
    match value.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => tracing::warn!("Ignoring unparseable environment value {:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_valid() {
        let config = PersonaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.avatar.frame_rate, 50);
        assert_eq!(config.server.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_sniffs_each_format() {
        let json = r#"{"server": {"port": 9001}, "avatar": {"frame_rate": 25}}"#;
        assert_eq!(PersonaConfig::from_str(json).unwrap().server.port, 9001);

        let toml = "[server]\nport = 9002\n\n[speech.segmenter]\nmin_chars = 30\n";
        let config = PersonaConfig::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9002);
        assert_eq!(config.speech.segmenter.min_chars, 30);

        let yaml = "server:\n  port: 9003\n  max_sessions: 8\n";
        let config = PersonaConfig::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9003);
        assert_eq!(config.server.max_sessions, 8);
    }

    #[test]
    fn test_from_file_uses_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhost = \"127.0.0.1\"\nport = 7000").unwrap();
        let config = PersonaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:7000");

        let mut bad = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(bad, "port = 1").unwrap();
        assert!(matches!(PersonaConfig::from_file(bad.path()), Err(ConfigError::Parse(_))));

        assert!(matches!(
            PersonaConfig::from_file("/nonexistent/persona.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_overlay() {
        let mut config = PersonaConfig::default();
        config.apply_vars(vec![
            ("PERSONA_PORT".to_string(), "8181".to_string()),
            ("PERSONA_MIN_SEGMENT_CHARS".to_string(), "30".to_string()),
            ("PERSONA_MAX_SESSIONS".to_string(), "not a number".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.speech.segmenter.min_chars, 30);
        assert_eq!(config.server.max_sessions, 256);
    }

    #[test]
    fn test_frame_rate_must_divide_sample_rate() {
        let mut config = PersonaConfig::default();
        config.avatar.frame_rate = 60;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_error_messages() {
        let mut config = PersonaConfig::default();
        config.server.max_sessions = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Validation error: max_sessions must be between 1 and 100000");

        let err: Box<dyn std::error::Error> = Box::new(ConfigError::Io("missing.toml".to_string()));
        assert_eq!(err.to_string(), "IO error: missing.toml");
    }
}
