pub mod file;
pub mod tts;

pub use file::PcmFile;
pub use tts::TtsRecorder;
