//! Synthetic tone engine
//!
//! Produces a quiet sine tone whose length follows the text length, so the
//! full session pipeline can run without an inference backend.

use crate::config::VoiceConfig;
use crate::engines::TtsEngine;
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use persona_core::AudioFormat;
use std::time::Duration;

pub struct ToneTtsEngine {
    name: String,
    ms_per_char: u64,
    format: AudioFormat,
}

impl ToneTtsEngine {
    const FREQUENCY_HZ: f32 = 220.0;
    const AMPLITUDE: f32 = 2_000.0;

    pub fn new(name: &str, ms_per_char: u64, format: AudioFormat) -> Self {
        Self {
            name: name.to_string(),
            ms_per_char,
            format,
        }
    }

    fn render(&self, duration: Duration) -> Bytes {
        let frames = self.format.bytes_for(duration) / self.format.frame_bytes();
        let mut out = BytesMut::with_capacity(frames * self.format.frame_bytes());
        let rate = self.format.sample_rate as f32;
        for i in 0..frames {
            let t = i as f32 / rate;
            // Short fade at both ends avoids clicks between segments
            let edge = (i.min(frames - i) as f32 / (rate * 0.01)).min(1.0);
            let sample = ((2.0 * std::f32::consts::PI * Self::FREQUENCY_HZ * t).sin()
                * Self::AMPLITUDE
                * edge) as i16;
            for _ in 0..self.format.channels {
                out.put_i16_le(sample);
            }
        }
        out.freeze()
    }
}

#[async_trait]
impl TtsEngine for ToneTtsEngine {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Bytes, SpeechError> {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count().max(1) as u64;
        Ok(self.render(Duration::from_millis(chars * self.ms_per_char)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duration_tracks_text_length() {
        let format = AudioFormat::default();
        let engine = ToneTtsEngine::new("tone", 50, format);
        let short = engine.synthesize("hi", &VoiceConfig::default()).await.unwrap();
        let long = engine.synthesize("hello there", &VoiceConfig::default()).await.unwrap();
        assert_eq!(format.duration_of(short.len()), Duration::from_millis(100));
        assert_eq!(format.duration_of(long.len()), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_output_is_whole_frames() {
        let format = AudioFormat { sample_rate: 22_050, channels: 2 };
        let engine = ToneTtsEngine::new("tone", 33, format);
        let audio = engine.synthesize("abc", &VoiceConfig::default()).await.unwrap();
        assert_eq!(audio.len() % format.frame_bytes(), 0);
    }
}
