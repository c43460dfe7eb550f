//! Connection negotiation
//!
//! The handshake itself belongs to the transport. The registry only needs
//! an answer for each offer, or a reason to refuse it.

use crate::error::ServerError;
use async_trait::async_trait;
use persona_core::AudioFormat;

#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Produce the answer for a client's offer
    async fn negotiate(&self, offer: &str) -> Result<String, ServerError>;

    fn name(&self) -> &str;
}

/// Media rides on the signaling socket itself, so the answer just
/// describes the stream the client will receive
pub struct LoopbackNegotiator {
    format: AudioFormat,
    frame_rate: u32,
}

impl LoopbackNegotiator {
    const MAX_OFFER_BYTES: usize = 64 * 1024;

    pub fn new(format: AudioFormat, frame_rate: u32) -> Self {
        Self { format, frame_rate }
    }
}

#[async_trait]
impl Negotiator for LoopbackNegotiator {
    async fn negotiate(&self, offer: &str) -> Result<String, ServerError> {
        let offer = offer.trim();
        if offer.is_empty() {
            return Err(ServerError::Negotiation("Empty offer".to_string()));
        }
        if offer.len() > Self::MAX_OFFER_BYTES {
            return Err(ServerError::Negotiation("Offer too large".to_string()));
        }
        if offer.contains('\0') {
            return Err(ServerError::Negotiation("Offer contains NUL bytes".to_string()));
        }

        Ok(format!(
            "transport=websocket;audio=pcm_s16le/{}/{};video=gray8;fps={}",
            self.format.sample_rate, self.format.channels, self.frame_rate
        ))
    }

    fn name(&self) -> &str {
        "loopback"
    }
}
