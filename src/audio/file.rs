use hound::{SampleFormat, WavReader};
use std::io;
use std::path::Path;
use tracing::info;

use crate::protocol::frame::{BIT_DEPTH, CHANNELS, SAMPLE_RATE};

/// Audio decoded into the PCM layout the service expects
pub struct PcmFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Little-endian 16-bit samples
    pub bytes: Vec<u8>,
}

impl PcmFile {
    pub fn is_wav(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
    }

    /// Decode a WAV file that is already 16kHz mono 16-bit
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(into_io)?;
        let spec = reader.spec();

        if spec.sample_rate != SAMPLE_RATE
            || spec.channels != CHANNELS
            || spec.bits_per_sample != BIT_DEPTH
            || spec.sample_format != SampleFormat::Int
        {
            // TODO: resample instead of rejecting once a resampler is in the stack
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "expected {}Hz {}ch {}-bit PCM, got {}Hz {}ch {}-bit",
                    SAMPLE_RATE,
                    CHANNELS,
                    BIT_DEPTH,
                    spec.sample_rate,
                    spec.channels,
                    spec.bits_per_sample
                ),
            ));
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(into_io)?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bytes: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        })
    }
}

fn into_io(error: hound::Error) -> io::Error {
    match error {
        hound::Error::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
