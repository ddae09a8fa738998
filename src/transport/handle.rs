use super::{CloseReason, FrameSink, TransportError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Connection lifecycle as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Open,
    /// Upload and receive tasks are running
    Streaming,
    Closing,
    Closed,
}

/// The one resource shared by the upload and receive tasks
///
/// Only the write half lives here; the read half is owned by the receive
/// task. Closing goes through [`ConnectionHandle::request_close`], which
/// sends the close frame at most once no matter how many callers race.
pub struct ConnectionHandle {
    sink: Mutex<Box<dyn FrameSink>>,
    state: Arc<watch::Sender<SessionState>>,
    close_requested: AtomicBool,
    frames_sent: AtomicUsize,
}

impl ConnectionHandle {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        let (state, _) = watch::channel(SessionState::Open);
        Self::with_state(sink, Arc::new(state))
    }

    /// Wrap a freshly opened sink, publishing its state on `state`
    pub fn with_state(sink: Box<dyn FrameSink>, state: Arc<watch::Sender<SessionState>>) -> Self {
        let handle = Self {
            sink: Mutex::new(sink),
            state,
            close_requested: AtomicBool::new(false),
            frames_sent: AtomicUsize::new(0),
        };
        handle.set_state(SessionState::Open);
        handle
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session state {:?} -> {:?}", previous, state);
        }
    }

    pub fn is_open(&self) -> bool {
        !self.close_requested.load(Ordering::SeqCst)
            && matches!(self.state(), SessionState::Open | SessionState::Streaming)
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Send one text frame, refusing once the connection is closing
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let mut sink = self.sink.lock().await;

        // A close may have won the lock first
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        sink.send_text(text).await?;
        self.frames_sent.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    /// Record that the peer closed the connection; later close requests become no-ops
    pub fn mark_peer_closed(&self) {
        if !self.close_requested.swap(true, Ordering::SeqCst) {
            info!("Connection closed by peer");
            self.set_state(SessionState::Closing);
        }
    }

    /// Close the connection unless someone already did
    ///
    /// Returns `true` only for the call that actually sent the close frame.
    pub async fn request_close(&self, reason: CloseReason) -> bool {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.set_state(SessionState::Closing);
        info!("Closing connection ({} {})", reason.code, reason.reason);

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close(reason).await {
            warn!("Failed to close connection cleanly: {}", e);
        }

        true
    }
}
