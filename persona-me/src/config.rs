//! Configuration for avatar rendering and session pacing

use persona_core::AudioFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Avatar and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Avatar model/ID passed to the renderer when a session acquires its handle
    pub avatar_id: Option<String>,

    /// Video frame rate; one audio chunk of `1/frame_rate` seconds per frame
    pub frame_rate: u32,

    /// Rendered-but-unsent chunks kept before the oldest is dropped
    pub max_buffered_frames: usize,

    /// Synthesized audio segments queued ahead of playback
    pub audio_queue_depth: usize,

    /// Per-frame render timeout in milliseconds
    pub render_timeout_ms: u64,

    /// Maximum bytes of microphone audio buffered between startRecording and stopRecording
    pub max_recording_bytes: usize,

    /// Control commands queued per session
    pub command_queue_depth: usize,

    /// Width of frames produced by the built-in renderer
    pub frame_width: u32,

    /// Height of frames produced by the built-in renderer
    pub frame_height: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            avatar_id: None,
            frame_rate: 50,
            max_buffered_frames: 25,
            audio_queue_depth: 32,
            render_timeout_ms: 40,
            max_recording_bytes: 10 * 1024 * 1024,
            command_queue_depth: 64,
            frame_width: 32,
            frame_height: 16,
        }
    }
}

impl AvatarConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err("Frame rate must be between 1 and 120".to_string());
        }

        if self.max_buffered_frames == 0 {
            return Err("max_buffered_frames must be greater than 0".to_string());
        }
        if self.max_buffered_frames > 10_000 {
            return Err("max_buffered_frames too large (max 10000)".to_string());
        }

        if self.audio_queue_depth == 0 || self.audio_queue_depth > 4_096 {
            return Err("audio_queue_depth must be between 1 and 4096".to_string());
        }

        if self.command_queue_depth == 0 || self.command_queue_depth > 4_096 {
            return Err("command_queue_depth must be between 1 and 4096".to_string());
        }

        if self.render_timeout_ms == 0 || self.render_timeout_ms > 10_000 {
            return Err("Render timeout must be between 1 and 10000 ms".to_string());
        }

        if self.max_recording_bytes == 0 {
            return Err("max_recording_bytes must be greater than 0".to_string());
        }

        if self.frame_width == 0 || self.frame_height == 0 || self.frame_width * self.frame_height > 1 << 20 {
            return Err("Frame dimensions must be non-zero and at most 1 megapixel".to_string());
        }

        if let Some(ref avatar_id) = self.avatar_id {
            if avatar_id.is_empty() {
                return Err("Avatar ID cannot be empty if provided".to_string());
            }
            if avatar_id.len() > 256 {
                return Err("Avatar ID too long (max 256 chars)".to_string());
            }
            if avatar_id.chars().any(|c| c == '\0' || c.is_control()) {
                return Err("Avatar ID contains invalid characters".to_string());
            }
        }

        Ok(())
    }

    /// Check that every frame carries a whole number of samples
    pub fn validate_for(&self, format: &AudioFormat) -> Result<(), String> {
        self.validate()?;
        if format.sample_rate % self.frame_rate != 0 {
            return Err(format!(
                "Sample rate {} is not a multiple of frame rate {}",
                format.sample_rate, self.frame_rate
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AvatarConfig::default();
        assert!(config.validate_for(&AudioFormat::default()).is_ok());
        assert_eq!(config.frame_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_frame_rate_must_divide_sample_rate() {
        let config = AvatarConfig {
            frame_rate: 30,
            ..Default::default()
        };
        let format = AudioFormat {
            sample_rate: 16_000,
            channels: 1,
        };
        assert!(config.validate().is_ok());
        assert!(config.validate_for(&format).is_err());
    }

    #[test]
    fn test_avatar_id_validation() {
        let mut config = AvatarConfig::default();
        config.avatar_id = Some(String::new());
        assert!(config.validate().is_err());
        config.avatar_id = Some("bad\0id".to_string());
        assert!(config.validate().is_err());
        config.avatar_id = Some("presenter-01".to_string());
        assert!(config.validate().is_ok());
    }
}
