//! Wire protocol for the session socket
//!
//! Control messages and server events are JSON text frames tagged by
//! `type`. Media goes out as binary frames: a fixed little-endian header,
//! then the PCM chunk, then the video frame bytes.
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 8    | tick                                    |
//! | 8      | 8    | run (0 while idle)                      |
//! | 16     | 8    | sequence (meaningful if flag bit 2 set) |
//! | 24     | 1    | flags: 1 silence, 2 ends segment, 4 has sequence |
//! | 25     | 4    | audio length in bytes                   |
//! | 29     | 2    | video width                             |
//! | 31     | 2    | video height                            |

use crate::error::ServerError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use persona_core::{Role, RunId, SessionId};
use persona_me::{MediaFrame, SessionCommand, SessionState, SessionUpdate};
use serde::{Deserialize, Serialize};

/// Largest accepted control frame; covers base64 audio chunks
pub const MAX_CONTROL_MESSAGE_BYTES: usize = 1024 * 1024;

pub const MEDIA_HEADER_LEN: usize = 33;

const FLAG_SILENCE: u8 = 1;
const FLAG_ENDS_SEGMENT: u8 = 2;
const FLAG_HAS_SEQUENCE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Opens the session; only valid as the first message
    Offer { sdp: String },
    Text { text: String },
    Interrupt,
    SetAudioType { voice: String },
    StartRecording,
    /// Base64 PCM in the server's audio format
    Audio { data: String },
    StopRecording,
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self, ServerError> {
        if text.len() > MAX_CONTROL_MESSAGE_BYTES {
            return Err(ServerError::MalformedControlMessage(format!(
                "Message too large ({} bytes, max {})",
                text.len(),
                MAX_CONTROL_MESSAGE_BYTES
            )));
        }
        serde_json::from_str(text).map_err(|e| ServerError::MalformedControlMessage(e.to_string()))
    }

    /// The session command this message maps to; `None` for the offer
    pub fn into_command(self) -> Result<Option<SessionCommand>, ServerError> {
        let command = match self {
            ControlMessage::Offer { .. } => return Ok(None),
            ControlMessage::Text { text } => SessionCommand::Text(text),
            ControlMessage::Interrupt => SessionCommand::Interrupt,
            ControlMessage::SetAudioType { voice } => SessionCommand::SetAudioType(voice),
            ControlMessage::StartRecording => SessionCommand::StartRecording,
            ControlMessage::Audio { data } => {
                let audio = BASE64
                    .decode(data.as_bytes())
                    .map_err(|e| ServerError::MalformedControlMessage(format!("Invalid audio data: {}", e)))?;
                SessionCommand::AudioInput(Bytes::from(audio))
            }
            ControlMessage::StopRecording => SessionCommand::StopRecording,
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    Answer {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        sdp: String,
    },
    State { state: SessionState },
    Transcript { role: Role, text: String, timestamp: String },
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","code":"internal","message":"serialization"}"#.to_string())
    }
}

impl From<&ServerError> for ServerEvent {
    fn from(err: &ServerError) -> Self {
        ServerEvent::error(err.code(), err.to_string())
    }
}

impl From<SessionUpdate> for ServerEvent {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::State(state) => ServerEvent::State { state },
            SessionUpdate::Transcript(record) => ServerEvent::Transcript {
                role: record.role,
                text: record.text,
                timestamp: record.timestamp.to_rfc3339(),
            },
            SessionUpdate::Error(message) => ServerEvent::error("session", message),
        }
    }
}

/// Decoded media frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeader {
    pub tick: u64,
    pub run: Option<RunId>,
    pub sequence: Option<u64>,
    pub is_silence: bool,
    pub ends_segment: bool,
    pub audio_len: usize,
    pub width: u16,
    pub height: u16,
}

pub fn encode_media(frame: &MediaFrame) -> Bytes {
    let chunk = &frame.chunk;
    let video = &frame.video;
    let mut buf = BytesMut::with_capacity(MEDIA_HEADER_LEN + chunk.audio.len() + video.data.len());

    let mut flags = 0u8;
    if chunk.is_silence {
        flags |= FLAG_SILENCE;
    }
    if chunk.ends_segment {
        flags |= FLAG_ENDS_SEGMENT;
    }
    if chunk.sequence.is_some() {
        flags |= FLAG_HAS_SEQUENCE;
    }

    buf.put_u64_le(chunk.tick);
    buf.put_u64_le(chunk.run.map(|r| r.0).unwrap_or(0));
    buf.put_u64_le(chunk.sequence.unwrap_or(0));
    buf.put_u8(flags);
    buf.put_u32_le(chunk.audio.len() as u32);
    buf.put_u16_le(video.width.min(u16::MAX as u32) as u16);
    buf.put_u16_le(video.height.min(u16::MAX as u32) as u16);
    buf.put_slice(&chunk.audio);
    buf.put_slice(&video.data);
    buf.freeze()
}

/// Split a media frame into its header, audio and video parts
pub fn decode_media(mut data: &[u8]) -> Result<(MediaHeader, &[u8], &[u8]), ServerError> {
    if data.len() < MEDIA_HEADER_LEN {
        return Err(ServerError::MalformedControlMessage("Media frame shorter than header".to_string()));
    }
    let tick = data.get_u64_le();
    let run = data.get_u64_le();
    let sequence = data.get_u64_le();
    let flags = data.get_u8();
    let audio_len = data.get_u32_le() as usize;
    let width = data.get_u16_le();
    let height = data.get_u16_le();

    if data.len() < audio_len {
        return Err(ServerError::MalformedControlMessage("Media frame truncated".to_string()));
    }
    let (audio, video) = data.split_at(audio_len);

    let header = MediaHeader {
        tick,
        run: (run != 0).then_some(RunId(run)),
        sequence: (flags & FLAG_HAS_SEQUENCE != 0).then_some(sequence),
        is_silence: flags & FLAG_SILENCE != 0,
        ends_segment: flags & FLAG_ENDS_SEGMENT != 0,
        audio_len,
        width,
        height,
    };
    Ok((header, audio, video))
}
