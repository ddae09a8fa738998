use super::error::SessionError;
use super::payload::{ChunkPlan, PayloadSource};
use crate::protocol::{encode_audio_frame, encode_text_frame, FrameStatus, SessionMetadata};
use crate::transport::{ConnectionHandle, TransportError};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// How the upload task finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadOutcome {
    /// Every frame, including the last, was sent
    Completed { frames: usize },
    /// The connection closed before the last frame
    StoppedEarly { frames: usize },
}

impl UploadOutcome {
    pub fn frames(&self) -> usize {
        match self {
            UploadOutcome::Completed { frames } | UploadOutcome::StoppedEarly { frames } => *frames,
        }
    }
}

/// Sends the payload as a sequence of frames
pub struct UploadDriver {
    metadata: SessionMetadata,
    chunk_size: usize,
    frame_interval: Duration,
}

impl UploadDriver {
    pub fn new(metadata: SessionMetadata, chunk_size: usize, frame_interval: Duration) -> Self {
        Self {
            metadata,
            chunk_size,
            frame_interval,
        }
    }

    pub async fn run(
        self,
        payload: PayloadSource,
        handle: Arc<ConnectionHandle>,
    ) -> Result<UploadOutcome, SessionError> {
        match payload {
            PayloadSource::Audio { reader, len } => self.upload_audio(reader, len, &handle).await,
            PayloadSource::Text(text) => self.upload_text(&text, &handle).await,
        }
    }

    async fn upload_audio<R>(
        &self,
        mut reader: R,
        len: u64,
        handle: &ConnectionHandle,
    ) -> Result<UploadOutcome, SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let plan = ChunkPlan::new(len, self.chunk_size);
        let total = plan.total();

        if total == 0 {
            return Err(SessionError::SourceRead(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "audio source is empty",
            )));
        }

        info!(
            "Uploading {} bytes of audio in {} frames ({}ms apart)",
            len,
            total,
            self.frame_interval.as_millis()
        );

        let mut buf = vec![0u8; self.chunk_size.max(1)];
        let mut sent = 0;

        for chunk in plan {
            let data = &mut buf[..chunk.len];
            reader
                .read_exact(data)
                .await
                .map_err(SessionError::SourceRead)?;

            if !handle.is_open() {
                info!("Connection closed after {}/{} frames, stopping upload", sent, total);
                return Ok(UploadOutcome::StoppedEarly { frames: sent });
            }

            let envelope = encode_audio_frame(data, chunk.status, &self.metadata);
            match handle.send(envelope.to_json()?).await {
                Ok(()) => sent += 1,
                Err(TransportError::Closed) => {
                    info!("Connection closed after {}/{} frames, stopping upload", sent, total);
                    return Ok(UploadOutcome::StoppedEarly { frames: sent });
                }
                Err(e) => return Err(SessionError::Transport(e)),
            }

            debug!(
                "Sent audio frame {}/{} ({} bytes, status={})",
                chunk.index, total, chunk.len, chunk.status
            );

            if chunk.status != FrameStatus::End && !self.frame_interval.is_zero() {
                tokio::time::sleep(self.frame_interval).await;
            }
        }

        info!("Audio upload complete: {} frames", sent);

        Ok(UploadOutcome::Completed { frames: sent })
    }

    async fn upload_text(
        &self,
        text: &str,
        handle: &ConnectionHandle,
    ) -> Result<UploadOutcome, SessionError> {
        let envelope = encode_text_frame(text, &self.metadata);

        match handle.send(envelope.to_json()?).await {
            Ok(()) => {
                info!("Sent text request ({} bytes)", text.len());
                Ok(UploadOutcome::Completed { frames: 1 })
            }
            Err(TransportError::Closed) => {
                info!("Connection closed before the text request was sent");
                Ok(UploadOutcome::StoppedEarly { frames: 0 })
            }
            Err(e) => Err(SessionError::Transport(e)),
        }
    }
}
