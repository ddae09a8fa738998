use crate::auth::Credentials;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "wss://aiui.xf-yun.com/v3/aiint/sos";

/// Everything the coordinator needs to run one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint, without authentication parameters
    pub endpoint: String,

    pub credentials: Credentials,

    /// Device serial number sent in every header
    pub sn: String,

    /// Scene configured in the service console (e.g., "main_box")
    pub scene: String,

    /// Voice for synthesized answers
    pub vcn: String,

    /// Bytes of PCM per audio frame
    /// Default: 1280 (40ms of 16kHz 16-bit mono)
    pub chunk_size: usize,

    /// Delay between audio frames, emulating real-time capture
    pub frame_interval: Duration,
}

impl SessionConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials,
            sn: format!("aiui-stream-{}", uuid::Uuid::new_v4()),
            scene: "main_box".to_string(),
            vcn: "x5_lingxiaoyue_flow".to_string(),
            chunk_size: 1280,
            frame_interval: Duration::from_millis(40),
        }
    }
}
