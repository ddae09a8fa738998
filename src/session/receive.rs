use super::error::SessionError;
use crate::protocol::{decode_envelope, BlockDecodeError, SpeechChunk, TextBlock};
use crate::transport::{CloseReason, ConnectionHandle, FrameSource, InboundFrame, TransportError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One decoded result, delivered in the order frames arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Text(TextBlock),
    /// A block that failed to decode; the session continues
    BlockError(BlockDecodeError),
    Speech {
        sid: Option<String>,
        chunk: SpeechChunk,
    },
}

impl fmt::Display for ResponseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseEvent::Text(block) => write!(f, "{} text: {}", block.block, block.text),
            ResponseEvent::BlockError(e) => write!(f, "undecodable {}", e),
            ResponseEvent::Speech { chunk, .. } => {
                write!(f, "tts audio: {} bytes", chunk.audio.len())
            }
        }
    }
}

/// How the result stream ended, when it ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamEnd {
    /// A frame with the terminal status arrived
    Terminal,
    /// The peer closed or dropped the connection first
    PeerClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveOutcome {
    pub end: StreamEnd,
    pub sid: Option<String>,
    pub frames: usize,
    pub text_events: usize,
}

/// Reads and decodes inbound envelopes until the terminal frame
#[derive(Debug, Default)]
pub struct ResponseDecoder;

impl ResponseDecoder {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        self,
        mut source: Box<dyn FrameSource>,
        handle: Arc<ConnectionHandle>,
        events: mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<ReceiveOutcome, SessionError> {
        let mut outcome = ReceiveOutcome {
            end: StreamEnd::PeerClosed,
            sid: None,
            frames: 0,
            text_events: 0,
        };

        let emit = |event: ResponseEvent| {
            // Events are informational; a dropped consumer must not stop the loop
            let _ = events.send(event);
        };

        loop {
            let bytes = match source.receive().await {
                Some(Ok(InboundFrame::Data(bytes))) => bytes,
                Some(Ok(InboundFrame::Closed { code, reason })) => {
                    info!("Peer closed the connection ({} {})", code, reason);
                    handle.mark_peer_closed();
                    return Ok(outcome);
                }
                None | Some(Err(TransportError::Closed)) => {
                    info!("Connection ended before the final result");
                    handle.mark_peer_closed();
                    return Ok(outcome);
                }
                Some(Err(e)) => {
                    error!("Receive failed: {}", e);
                    return Err(SessionError::Transport(e));
                }
            };

            outcome.frames += 1;

            let frame = decode_envelope(&bytes).map_err(|e| {
                error!("Rejected response: {}", e);
                SessionError::from(e)
            })?;

            if outcome.sid.is_none() {
                if let Some(sid) = &frame.sid {
                    info!("Server session id: {}", sid);
                    outcome.sid = Some(sid.clone());
                }
            }

            debug!(
                "Frame {} status={:?} blocks={}",
                outcome.frames,
                frame.status,
                frame.blocks.len()
            );

            let terminal = frame.is_terminal();

            for block in frame.blocks {
                match block {
                    Ok(text) => {
                        outcome.text_events += 1;
                        emit(ResponseEvent::Text(text));
                    }
                    Err(e) => {
                        warn!("Skipping result block: {}", e);
                        emit(ResponseEvent::BlockError(e));
                    }
                }
            }

            match frame.speech {
                Some(Ok(chunk)) => emit(ResponseEvent::Speech {
                    sid: frame.sid.clone(),
                    chunk,
                }),
                Some(Err(e)) => {
                    warn!("Skipping result block: {}", e);
                    emit(ResponseEvent::BlockError(e));
                }
                None => {}
            }

            if terminal {
                info!("Final result received after {} frames", outcome.frames);
                handle
                    .request_close(CloseReason::normal("final result received"))
                    .await;
                outcome.end = StreamEnd::Terminal;
                return Ok(outcome);
            }
        }
    }
}
