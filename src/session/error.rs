use crate::auth::SigningError;
use crate::protocol::DecodeError;
use crate::transport::TransportError;
use thiserror::Error;

/// Why a session ended unsuccessfully
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign handshake: {0}")]
    Signing(#[from] SigningError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] TransportError),

    #[error("cannot read payload source: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("malformed response envelope: {reason}")]
    MalformedEnvelope { reason: String, raw: String },

    /// Non-zero response code; `raw` is the complete response
    #[error("server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        sid: Option<String>,
        raw: String,
    },

    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{task} task panicked: {message}")]
    TaskPanicked { task: &'static str, message: String },
}

impl SessionError {
    /// Process exit status for this failure, distinct per kind
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Signing(_) => 10,
            SessionError::Handshake(_) => 11,
            SessionError::SourceRead(_) => 12,
            SessionError::MalformedEnvelope { .. } => 13,
            SessionError::Server { .. } => 14,
            SessionError::Transport(_) => 15,
            SessionError::Encode(_) => 16,
            SessionError::TaskPanicked { .. } => 17,
        }
    }
}

impl From<DecodeError> for SessionError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::Malformed { reason, raw } => SessionError::MalformedEnvelope { reason, raw },
            DecodeError::Server {
                code,
                message,
                sid,
                raw,
            } => SessionError::Server {
                code,
                message,
                sid,
                raw,
            },
        }
    }
}
