//! Text generation and transcript collaborators

use crate::error::AvatarError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use persona_core::{RunId, SessionId, TranscriptRecord};
use std::time::Duration;
use tracing::info;

/// Input for one assistant turn
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub session_id: SessionId,
    pub run: RunId,
    pub text: String,
}

/// Produces the assistant's reply as a stream of text fragments
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, AvatarError>>, AvatarError>;

    fn name(&self) -> &str;
}

/// Replies with the user's own words, one word per fragment
pub struct EchoGenerator {
    delay: Duration,
    prefix: String,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(30),
            prefix: "You said: ".to_string(),
        }
    }

    /// Pause between fragments, to behave like a streaming model
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, AvatarError>>, AvatarError> {
        let reply = format!("{}{}", self.prefix, request.text.trim());
        let words: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        let delay = self.delay;

        Ok(stream::iter(words)
            .then(move |word| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(word)
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Hand-off point for conversation records; nothing is read back
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn record(&self, record: TranscriptRecord) -> Result<(), AvatarError>;
}

/// Writes transcript records to the log
pub struct TracingTranscriptSink;

#[async_trait]
impl TranscriptSink for TracingTranscriptSink {
    async fn record(&self, record: TranscriptRecord) -> Result<(), AvatarError> {
        info!(
            session = %record.session_id,
            role = ?record.role,
            at = %record.timestamp.to_rfc3339(),
            "transcript: {}",
            record.text
        );
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemoryTranscriptSink {
    records: Mutex<Vec<TranscriptRecord>>,
}

impl MemoryTranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TranscriptSink for MemoryTranscriptSink {
    async fn record(&self, record: TranscriptRecord) -> Result<(), AvatarError> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::Role;

    #[tokio::test(start_paused = true)]
    async fn test_echo_streams_words() {
        let generator = EchoGenerator::new().with_prefix("");
        let stream = generator
            .generate(GenerationRequest {
                session_id: SessionId::new(),
                run: RunId(1),
                text: "hello there friend".to_string(),
            })
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["hello ", "there ", "friend"]);
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryTranscriptSink::new();
        let id = SessionId::new();
        sink.record(TranscriptRecord::new(id, Role::User, "hi")).await.unwrap();
        sink.record(TranscriptRecord::new(id, Role::Assistant, "hello")).await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].role, Role::Assistant);
    }
}
