//! Bidirectional frame transport
//!
//! The session only needs five primitives from a connection: open, send a
//! text frame, receive a frame, observe whether it is still open, and close
//! it with a reason. They are split across [`Connector`], [`FrameSink`] and
//! [`FrameSource`] so the writing and reading halves can live in different
//! tasks. [`ConnectionHandle`] wraps the sink and owns the connection state.

mod handle;
pub mod memory;
mod ws;

pub use handle::{ConnectionHandle, SessionState};
pub use memory::{ClientMessage, MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

use thiserror::Error;
use url::Url;

/// WebSocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is no longer open. Benign for the upload side.
    #[error("connection closed")]
    Closed,

    /// The server answered the upgrade request with a non-101 status
    #[error("handshake rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The upgrade did not finish in time
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// A frame received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text or binary message content
    Data(Vec<u8>),
    /// The peer sent a close frame
    Closed { code: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// Write half of a connection
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Send one UTF-8 text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a close frame and shut the write half
    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame, `None` once the stream has ended
    ///
    /// There is no timeout: a silent peer blocks this call indefinitely.
    async fn receive(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// Opens connections
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError>;
}
