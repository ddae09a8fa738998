use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PCM parameters of both the uploaded audio and the requested speech
pub const SAMPLE_RATE: u32 = 16000;
pub const CHANNELS: u16 = 1;
pub const BIT_DEPTH: u16 = 16;

/// Position of a frame within its logical stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum FrameStatus {
    /// First frame of a multi-frame stream
    Start,
    /// Any frame between the first and the last
    Continue,
    /// Last frame; also the only frame of a single-chunk stream
    End,
    /// Complete request in one frame (text requests)
    Once,
}

impl FrameStatus {
    /// Status of chunk `index` (1-based) out of `total`
    pub fn for_position(index: usize, total: usize) -> Self {
        if index == total {
            FrameStatus::End
        } else if index == 1 {
            FrameStatus::Start
        } else {
            FrameStatus::Continue
        }
    }
}

impl From<FrameStatus> for u8 {
    fn from(status: FrameStatus) -> Self {
        match status {
            FrameStatus::Start => 0,
            FrameStatus::Continue => 1,
            FrameStatus::End => 2,
            FrameStatus::Once => 3,
        }
    }
}

impl TryFrom<u8> for FrameStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameStatus::Start),
            1 => Ok(FrameStatus::Continue),
            2 => Ok(FrameStatus::End),
            3 => Ok(FrameStatus::Once),
            other => Err(format!("unknown frame status {}", other)),
        }
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStatus::Start => "start",
            FrameStatus::Continue => "continue",
            FrameStatus::End => "end",
            FrameStatus::Once => "once",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractMode {
    /// Streaming audio, results arrive while the upload is running
    Continuous,
    /// Single request, single answer
    Oneshot,
}

/// Per-session values attached to every outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub app_id: String,
    /// Device serial number
    pub sn: String,
    pub stream_id: String,
    pub scene: String,
    /// Voice used for synthesized answers
    pub vcn: String,
    pub interact_mode: InteractMode,
}

impl SessionMetadata {
    /// Metadata for a streamed audio request
    pub fn audio(
        app_id: impl Into<String>,
        sn: impl Into<String>,
        scene: impl Into<String>,
        vcn: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            sn: sn.into(),
            stream_id: "audio-1".to_string(),
            scene: scene.into(),
            vcn: vcn.into(),
            interact_mode: InteractMode::Continuous,
        }
    }

    /// Metadata for a one-shot text request
    pub fn text(
        app_id: impl Into<String>,
        sn: impl Into<String>,
        scene: impl Into<String>,
        vcn: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            sn: sn.into(),
            stream_id: "text-1".to_string(),
            scene: scene.into(),
            vcn: vcn.into(),
            interact_mode: InteractMode::Oneshot,
        }
    }
}

// ============================================================================
// Wire envelope
// ============================================================================

/// One outbound JSON message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub header: FrameHeader,
    pub parameter: Parameter,
    pub payload: OutboundPayload,
}

impl OutboundEnvelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn status(&self) -> FrameStatus {
        self.header.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub appid: String,
    pub sn: String,
    pub stmid: String,
    pub status: FrameStatus,
    pub scene: String,
    pub interact_mode: InteractMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub nlp: NlpParameter,
    pub tts: TtsParameter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpParameter {
    pub nlp: ResultFormat,
    pub new_session: bool,
}

/// Format in which the service returns a result block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFormat {
    pub compress: String,
    pub format: String,
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsParameter {
    pub vcn: String,
    pub tts: PcmFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub channels: u16,
    pub bit_depth: u16,
    pub sample_rate: u32,
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundPayload {
    Audio(AudioPayload),
    Text(TextPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub status: FrameStatus,
    /// Base64-encoded PCM bytes
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub compress: String,
    pub format: String,
    pub encoding: String,
    pub status: FrameStatus,
    /// Base64-encoded UTF-8 text
    pub text: String,
}

// ============================================================================
// Encoders
// ============================================================================

/// Encode one chunk of 16 kHz mono 16-bit PCM
pub fn encode_audio_frame(
    chunk: &[u8],
    status: FrameStatus,
    metadata: &SessionMetadata,
) -> OutboundEnvelope {
    OutboundEnvelope {
        header: header(metadata, status),
        parameter: parameter(metadata),
        payload: OutboundPayload::Audio(AudioPayload {
            encoding: "raw".to_string(),
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bit_depth: BIT_DEPTH,
            status,
            audio: base64::engine::general_purpose::STANDARD.encode(chunk),
        }),
    }
}

/// Encode a complete text request; always a single `Once` frame
pub fn encode_text_frame(text: &str, metadata: &SessionMetadata) -> OutboundEnvelope {
    let status = FrameStatus::Once;

    OutboundEnvelope {
        header: header(metadata, status),
        parameter: parameter(metadata),
        payload: OutboundPayload::Text(TextPayload {
            compress: "raw".to_string(),
            format: "plain".to_string(),
            encoding: "utf8".to_string(),
            status,
            text: base64::engine::general_purpose::STANDARD.encode(text.as_bytes()),
        }),
    }
}

fn header(metadata: &SessionMetadata, status: FrameStatus) -> FrameHeader {
    FrameHeader {
        appid: metadata.app_id.clone(),
        sn: metadata.sn.clone(),
        stmid: metadata.stream_id.clone(),
        status,
        scene: metadata.scene.clone(),
        interact_mode: metadata.interact_mode,
    }
}

fn parameter(metadata: &SessionMetadata) -> Parameter {
    Parameter {
        nlp: NlpParameter {
            nlp: ResultFormat {
                compress: "raw".to_string(),
                format: "json".to_string(),
                encoding: "utf8".to_string(),
            },
            new_session: true,
        },
        tts: TtsParameter {
            vcn: metadata.vcn.clone(),
            tts: PcmFormat {
                channels: CHANNELS,
                bit_depth: BIT_DEPTH,
                sample_rate: SAMPLE_RATE,
                encoding: "raw".to_string(),
            },
        },
    }
}
