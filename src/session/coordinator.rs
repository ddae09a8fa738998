use super::config::SessionConfig;
use super::error::SessionError;
use super::payload::PayloadSource;
use super::receive::{ReceiveOutcome, ResponseDecoder, ResponseEvent};
use super::stats::SessionReport;
use super::upload::{UploadDriver, UploadOutcome};
use crate::auth::build_handshake_url;
use crate::transport::{CloseReason, ConnectionHandle, Connector, SessionState};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// Runs one session: handshake, concurrent upload and receive, close
pub struct SessionCoordinator<C> {
    config: SessionConfig,
    connector: C,
    state: Arc<watch::Sender<SessionState>>,
}

impl<C: Connector> SessionCoordinator<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);

        Self {
            config,
            connector,
            state: Arc::new(state),
        }
    }

    /// State of the current (or last) session
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions of every run
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the session to completion
    ///
    /// Both tasks are always joined before the connection is released. When
    /// both fail, the receive error is reported.
    pub async fn run(
        &self,
        payload: PayloadSource,
        events: mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<SessionReport, SessionError> {
        let started_at = Utc::now();
        let metadata = payload.metadata(&self.config);

        info!(
            "Starting session: scene={}, stream={}, mode={:?}",
            metadata.scene, metadata.stream_id, metadata.interact_mode
        );
        self.state.send_replace(SessionState::Connecting);

        let opened = match build_handshake_url(&self.config.endpoint, &self.config.credentials) {
            Ok(url) => self.connector.open(&url).await.map_err(|e| {
                error!("Handshake failed: {}", e);
                SessionError::Handshake(e)
            }),
            Err(e) => Err(e.into()),
        };
        let (sink, source) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                self.state.send_replace(SessionState::Closed);
                return Err(e);
            }
        };

        let handle = Arc::new(ConnectionHandle::with_state(sink, Arc::clone(&self.state)));
        handle.set_state(SessionState::Streaming);

        let upload_task = {
            let handle = Arc::clone(&handle);
            let driver = UploadDriver::new(
                metadata,
                self.config.chunk_size,
                self.config.frame_interval,
            );

            tokio::spawn(async move {
                let result = driver.run(payload, Arc::clone(&handle)).await;

                // no last frame will follow, so the server must be told to stop
                if let Err(e) = &result {
                    error!("Upload failed: {}", e);
                    handle.request_close(CloseReason::normal("upload failed")).await;
                }

                result
            })
        };

        let receive_task =
            tokio::spawn(ResponseDecoder::new().run(source, Arc::clone(&handle), events));

        let (upload, receive) = tokio::join!(upload_task, receive_task);
        let upload = flatten("upload", upload);
        let receive = flatten("receive", receive);

        handle
            .request_close(CloseReason::normal("session finished"))
            .await;
        handle.set_state(SessionState::Closed);

        let frames_sent = handle.frames_sent();
        let duration = Utc::now().signed_duration_since(started_at);

        let (upload, receive): (UploadOutcome, ReceiveOutcome) = match (upload, receive) {
            (upload, Err(e)) => {
                if let Err(upload_error) = upload {
                    warn!("Upload also failed: {}", upload_error);
                }
                return Err(e);
            }
            (Err(e), Ok(_)) => return Err(e),
            (Ok(upload), Ok(receive)) => (upload, receive),
        };

        let report = SessionReport {
            sid: receive.sid,
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent,
            frames_received: receive.frames,
            text_events: receive.text_events,
            upload,
            stream_end: receive.end,
        };

        info!(
            "Session finished: sent={}, received={}, end={:?}",
            report.frames_sent, report.frames_received, report.stream_end
        );

        Ok(report)
    }
}

fn flatten<T>(
    task: &'static str,
    joined: Result<Result<T, SessionError>, JoinError>,
) -> Result<T, SessionError> {
    joined.map_err(|e| SessionError::TaskPanicked {
        task,
        message: e.to_string(),
    })?
}
