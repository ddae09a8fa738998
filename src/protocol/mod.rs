//! Wire format of the streaming protocol
//!
//! Outbound frames are JSON envelopes `{header, parameter, payload}`; inbound
//! envelopes carry a `header` with a response code plus any number of
//! optional, base64-encoded result blocks.

pub mod frame;
pub mod response;

pub use frame::{
    encode_audio_frame, encode_text_frame, FrameStatus, InteractMode, OutboundEnvelope,
    OutboundPayload, SessionMetadata,
};
pub use response::{
    decode_envelope, iat_transcript, BlockDecodeError, DecodeError, DecodedFrame, SemanticResult,
    SpeechChunk, TextBlock, TidyIntent, TidyResult, TEXT_BLOCKS,
};
