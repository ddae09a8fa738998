//! Streaming session
//!
//! This module provides the `SessionCoordinator` that manages:
//! - Handshake signing and connection setup
//! - The upload task (paced audio frames or a one-shot text frame)
//! - The receive task (envelope decoding and result events)
//! - Shutdown ordering and error propagation between the two

mod config;
mod coordinator;
mod error;
mod payload;
mod receive;
mod stats;
mod upload;

pub use config::{SessionConfig, DEFAULT_ENDPOINT};
pub use coordinator::SessionCoordinator;
pub use error::SessionError;
pub use payload::{ChunkPlan, ChunkSpec, PayloadSource};
pub use receive::{ReceiveOutcome, ResponseDecoder, ResponseEvent, StreamEnd};
pub use stats::SessionReport;
pub use upload::{UploadDriver, UploadOutcome};
