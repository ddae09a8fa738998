use super::receive::StreamEnd;
use super::upload::UploadOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Summary of a session that ended without a fatal error
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Server-assigned session id, if any response carried one
    pub sid: Option<String>,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Frames written to the connection
    pub frames_sent: usize,

    /// Envelopes read from the connection
    pub frames_received: usize,

    /// Text blocks successfully decoded
    pub text_events: usize,

    pub upload: UploadOutcome,

    pub stream_end: StreamEnd,
}
