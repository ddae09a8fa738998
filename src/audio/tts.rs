use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::protocol::frame::{BIT_DEPTH, CHANNELS, SAMPLE_RATE};
use crate::protocol::SpeechChunk;

/// Saves synthesized speech, one file per server session id
pub struct TtsRecorder {
    output_dir: PathBuf,
    wav: bool,
    current: Option<SpeechFile>,
}

impl TtsRecorder {
    /// `wav` wraps raw PCM answers in a WAV container
    pub fn new(output_dir: impl Into<PathBuf>, wav: bool) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).context("Failed to create TTS output directory")?;

        Ok(Self {
            output_dir,
            wav,
            current: None,
        })
    }

    /// Append one chunk
    ///
    /// A new sid, or `seq` 1 within the current one, starts a fresh file that
    /// replaces any file of the same name.
    pub fn write(&mut self, sid: Option<&str>, chunk: &SpeechChunk) -> Result<()> {
        let sid = sid.unwrap_or("sid");

        let switch = match &self.current {
            Some(current) => current.sid != sid || chunk.seq == Some(1),
            None => true,
        };

        if switch {
            self.finish()?;
            self.current = Some(SpeechFile::create(
                &self.output_dir,
                sid,
                chunk.encoding.as_deref(),
                self.wav,
            )?);
        }

        if let Some(current) = &mut self.current {
            current.write(&chunk.audio)?;
        }

        Ok(())
    }

    /// Close the current file, returning its path
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        match self.current.take() {
            Some(file) => file.finish().map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for TtsRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finalize TTS file on drop: {}", e);
        }
    }
}

/// File suffix for a `tts.encoding` value
pub fn suffix(encoding: Option<&str>) -> &'static str {
    match encoding {
        Some("raw") => "pcm",
        Some("lame") => "mp3",
        _ => "bin",
    }
}

struct SpeechFile {
    sid: String,
    path: PathBuf,
    sink: SpeechSink,
    bytes: usize,
}

enum SpeechSink {
    Bytes(BufWriter<File>),
    Wav {
        writer: hound::WavWriter<BufWriter<File>>,
        // odd byte waiting for its partner sample byte
        pending: Option<u8>,
    },
}

impl SpeechFile {
    fn create(dir: &Path, sid: &str, encoding: Option<&str>, wav: bool) -> Result<Self> {
        let as_wav = wav && encoding == Some("raw");
        let extension = if as_wav { "wav" } else { suffix(encoding) };
        let path = dir.join(format!("{}.{}", sid, extension));

        let sink = if as_wav {
            let spec = hound::WavSpec {
                channels: CHANNELS,
                sample_rate: SAMPLE_RATE,
                bits_per_sample: BIT_DEPTH,
                sample_format: hound::SampleFormat::Int,
            };
            let writer = hound::WavWriter::create(&path, spec)
                .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
            SpeechSink::Wav {
                writer,
                pending: None,
            }
        } else {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create TTS file: {:?}", path))?;
            SpeechSink::Bytes(BufWriter::new(file))
        };

        info!("Writing synthesized speech to {}", path.display());

        Ok(Self {
            sid: sid.to_string(),
            path,
            sink,
            bytes: 0,
        })
    }

    fn write(&mut self, audio: &[u8]) -> Result<()> {
        match &mut self.sink {
            SpeechSink::Bytes(file) => file.write_all(audio).context("Failed to write TTS audio")?,
            SpeechSink::Wav { writer, pending } => {
                let mut bytes = audio.iter().copied();
                if let Some(low) = pending.take() {
                    match bytes.next() {
                        Some(high) => writer
                            .write_sample(i16::from_le_bytes([low, high]))
                            .context("Failed to write sample to WAV")?,
                        None => *pending = Some(low),
                    }
                }

                let rest: Vec<u8> = bytes.collect();
                let mut pairs = rest.chunks_exact(2);
                for pair in &mut pairs {
                    writer
                        .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                        .context("Failed to write sample to WAV")?;
                }
                if let [odd] = pairs.remainder() {
                    *pending = Some(*odd);
                }
            }
        }

        self.bytes += audio.len();
        Ok(())
    }

    fn finish(self) -> Result<PathBuf> {
        match self.sink {
            SpeechSink::Bytes(mut file) => file.flush().context("Failed to flush TTS file")?,
            SpeechSink::Wav { writer, .. } => {
                writer.finalize().context("Failed to finalize WAV file")?
            }
        }

        info!(
            "Synthesized speech saved: {} ({} bytes)",
            self.path.display(),
            self.bytes
        );

        Ok(self.path)
    }
}
