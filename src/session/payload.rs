use super::config::SessionConfig;
use super::error::SessionError;
use crate::audio::PcmFile;
use crate::protocol::{FrameStatus, SessionMetadata};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use tokio::io::AsyncRead;
use tracing::info;

/// What gets uploaded during a session
pub enum PayloadSource {
    /// 16kHz mono 16-bit PCM of known length
    Audio {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        len: u64,
    },
    /// One-shot text question
    Text(String),
}

impl PayloadSource {
    pub fn text(text: impl Into<String>) -> Self {
        PayloadSource::Text(text.into())
    }

    /// In-memory PCM
    pub fn audio_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        PayloadSource::Audio {
            reader: Box::new(Cursor::new(bytes)),
            len,
        }
    }

    /// Open an audio file
    ///
    /// `.wav` files are decoded and must already be 16kHz mono; anything
    /// else is streamed from disk as raw PCM.
    pub async fn open_audio(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();

        if PcmFile::is_wav(&path) {
            let pcm = tokio::task::spawn_blocking(move || PcmFile::open(path))
                .await
                .map_err(|e| SessionError::TaskPanicked {
                    task: "wav decode",
                    message: e.to_string(),
                })?
                .map_err(SessionError::SourceRead)?;
            return Ok(Self::audio_bytes(pcm.bytes));
        }

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(SessionError::SourceRead)?;
        let len = file
            .metadata()
            .await
            .map_err(SessionError::SourceRead)?
            .len();

        info!("Opened raw PCM source {} ({} bytes)", path.display(), len);

        Ok(PayloadSource::Audio {
            reader: Box::new(file),
            len,
        })
    }

    /// Frame metadata matching this kind of request
    pub fn metadata(&self, config: &SessionConfig) -> SessionMetadata {
        let app_id = config.credentials.app_id.as_str();
        match self {
            PayloadSource::Audio { .. } => {
                SessionMetadata::audio(app_id, &config.sn, &config.scene, &config.vcn)
            }
            PayloadSource::Text(_) => {
                SessionMetadata::text(app_id, &config.sn, &config.scene, &config.vcn)
            }
        }
    }
}

impl fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSource::Audio { len, .. } => f.debug_struct("Audio").field("len", len).finish(),
            PayloadSource::Text(text) => f.debug_tuple("Text").field(text).finish(),
        }
    }
}

/// One planned audio frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 1-based position in the stream
    pub index: usize,
    pub len: usize,
    pub status: FrameStatus,
}

/// Splits a source of `size` bytes into contiguous `chunk_size` pieces
///
/// Only the final chunk may be shorter than `chunk_size`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: usize,
    total: usize,
    next: usize,
}

impl ChunkPlan {
    pub fn new(size: u64, chunk_size: usize) -> Self {
        // a zero chunk size would never cover the source
        let chunk_size = chunk_size.max(1);
        let total = size.div_ceil(chunk_size as u64) as usize;

        Self {
            size,
            chunk_size,
            total,
            next: 1,
        }
    }

    /// Number of frames, `ceil(size / chunk_size)`
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkSpec;

    fn next(&mut self) -> Option<ChunkSpec> {
        if self.next > self.total {
            return None;
        }

        let index = self.next;
        self.next += 1;

        let offset = (index as u64 - 1) * self.chunk_size as u64;
        let len = (self.size - offset).min(self.chunk_size as u64) as usize;

        Some(ChunkSpec {
            index,
            len,
            status: FrameStatus::for_position(index, self.total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(total: usize) -> Vec<FrameStatus> {
        ChunkPlan::new(total as u64 * 10, 10).map(|c| c.status).collect()
    }

    #[test]
    fn test_plan_3200_bytes() {
        let plan: Vec<_> = ChunkPlan::new(3200, 1280).collect();

        let lens: Vec<_> = plan.iter().map(|c| c.len).collect();
        let status: Vec<_> = plan.iter().map(|c| c.status).collect();
        let index: Vec<_> = plan.iter().map(|c| c.index).collect();

        assert_eq!(lens, [1280, 1280, 640]);
        assert_eq!(
            status,
            [FrameStatus::Start, FrameStatus::Continue, FrameStatus::End]
        );
        assert_eq!(index, [1, 2, 3]);
    }

    #[test]
    fn test_status_sequence_for_all_lengths() {
        assert_eq!(statuses(1), [FrameStatus::End]);
        assert_eq!(statuses(2), [FrameStatus::Start, FrameStatus::End]);

        for n in 3..20 {
            let seq = statuses(n);
            assert_eq!(seq.len(), n);
            assert_eq!(seq[0], FrameStatus::Start);
            assert_eq!(seq[n - 1], FrameStatus::End);
            assert!(seq[1..n - 1].iter().all(|s| *s == FrameStatus::Continue));
        }
    }

    #[test]
    fn test_plan_exact_multiple_and_short_source() {
        let lens: Vec<_> = ChunkPlan::new(2560, 1280).map(|c| c.len).collect();
        assert_eq!(lens, [1280, 1280]);

        let single: Vec<_> = ChunkPlan::new(100, 1280).collect();
        assert_eq!(
            single,
            [ChunkSpec {
                index: 1,
                len: 100,
                status: FrameStatus::End
            }]
        );
    }

    #[test]
    fn test_plan_empty_source() {
        let plan = ChunkPlan::new(0, 1280);
        assert_eq!(plan.total(), 0);
        assert_eq!(plan.count(), 0);
    }

    #[test]
    fn test_text_metadata_is_one_shot() {
        let config = SessionConfig::new(crate::auth::Credentials::new("app", "k", "s"));
        let meta = PayloadSource::text("hi").metadata(&config);
        assert_eq!(meta.stream_id, "text-1");
        assert_eq!(meta.interact_mode, crate::protocol::InteractMode::Oneshot);

        let meta = PayloadSource::audio_bytes(vec![0; 4]).metadata(&config);
        assert_eq!(meta.stream_id, "audio-1");
        assert_eq!(meta.app_id, "app");
    }
}
