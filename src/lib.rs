pub mod audio;
pub mod auth;
pub mod config;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{PcmFile, TtsRecorder};
pub use auth::{build_handshake_url, Credentials, SigningError};
pub use config::{Config, RequestMode};
pub use protocol::{
    decode_envelope, encode_audio_frame, encode_text_frame, DecodeError, DecodedFrame,
    FrameStatus, SessionMetadata,
};
pub use session::{
    PayloadSource, ResponseEvent, SessionConfig, SessionCoordinator, SessionError, SessionReport,
};
pub use transport::{Connector, MemoryConnector, WsConnector};
