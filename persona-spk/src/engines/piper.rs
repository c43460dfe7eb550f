//! Piper engine
//! Local neural TTS through the piper executable, streaming raw PCM on stdout

use crate::config::VoiceConfig;
use crate::engines::TtsEngine;
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use persona_core::AudioFormat;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const MAX_AUDIO_SIZE: usize = 10 * 1024 * 1024;

pub struct PiperTtsEngine {
    name: String,
    executable: PathBuf,
    model_path: PathBuf,
    format: AudioFormat,
}

impl PiperTtsEngine {
    pub fn new(
        name: &str,
        executable: Option<PathBuf>,
        model_path: PathBuf,
        format: AudioFormat,
    ) -> Result<Self, SpeechError> {
        if format.channels != 1 {
            return Err(SpeechError::Config("Piper only produces mono audio".to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            executable: executable.unwrap_or_else(|| PathBuf::from("piper")),
            model_path,
            format,
        })
    }

    /// Drop control characters; text goes through stdin so no shell quoting is involved
    fn sanitize(text: &str) -> String {
        text.chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect()
    }
}

#[async_trait]
impl TtsEngine for PiperTtsEngine {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Bytes, SpeechError> {
        // Dropping the future (cancellation or timeout) kills the child
        let mut child = Command::new(&self.executable)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::engine(&self.name, format!("failed to start piper: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", Self::sanitize(text));
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| SpeechError::engine(&self.name, format!("failed to write text: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SpeechError::engine(&self.name, format!("piper did not finish: {}", e)))?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::engine(&self.name, format!("synthesis failed: {}", error_msg.trim())));
        }

        let mut audio = output.stdout;
        if audio.len() > MAX_AUDIO_SIZE {
            return Err(SpeechError::engine(&self.name, format!("audio too large ({} bytes)", audio.len())));
        }
        audio.truncate(audio.len() - audio.len() % self.format.frame_bytes());

        debug!("{} produced {} bytes", self.name, audio.len());
        Ok(Bytes::from(audio))
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        if !self.model_path.exists() {
            return Err(SpeechError::engine(&self.name, "model file missing"));
        }
        let status = Command::new(&self.executable)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| SpeechError::engine(&self.name, format!("piper not runnable: {}", e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::engine(&self.name, "piper --help failed"))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
