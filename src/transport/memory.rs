//! In-process loopback transport
//!
//! [`MemoryConnector`] hands the session one end of a pair of unbounded
//! channels; the [`MemoryPeer`] holds the other end and plays the server.

use super::{CloseReason, Connector, FrameSink, FrameSource, InboundFrame, TransportError};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

/// What the client wrote to the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Text(String),
    Close(CloseReason),
}

struct Endpoints {
    sink: MemorySink,
    source: MemorySource,
}

pub struct MemoryConnector {
    endpoints: Mutex<Option<Endpoints>>,
    opened_url: Arc<Mutex<Option<String>>>,
    rejection: Option<(u16, String)>,
}

impl MemoryConnector {
    /// A connector that can be opened once, and the peer on the other side
    pub fn pair() -> (Self, MemoryPeer) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let opened_url = Arc::new(Mutex::new(None));

        let connector = Self {
            endpoints: Mutex::new(Some(Endpoints {
                sink: MemorySink {
                    tx: client_tx,
                    closed: false,
                },
                source: MemorySource { rx: server_rx },
            })),
            opened_url: Arc::clone(&opened_url),
            rejection: None,
        };

        let peer = MemoryPeer {
            rx: client_rx,
            tx: Some(server_tx),
            opened_url,
        };

        (connector, peer)
    }

    /// A connector whose handshake always fails with `status`
    pub fn rejecting(status: u16, body: impl Into<String>) -> Self {
        Self {
            endpoints: Mutex::new(None),
            opened_url: Arc::new(Mutex::new(None)),
            rejection: Some((status, body.into())),
        }
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        if let Some((status, body)) = &self.rejection {
            return Err(TransportError::Rejected {
                status: *status,
                body: body.clone(),
            });
        }

        let endpoints = self
            .endpoints
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(TransportError::Closed)?;

        if let Ok(mut opened) = self.opened_url.lock() {
            *opened = Some(url.to_string());
        }

        Ok((Box::new(endpoints.sink), Box::new(endpoints.source)))
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<ClientMessage>,
    closed: bool,
}

#[async_trait::async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(ClientMessage::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        self.tx
            .send(ClientMessage::Close(reason))
            .map_err(|_| TransportError::Closed)
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait::async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Server side of a [`MemoryConnector`]
pub struct MemoryPeer {
    rx: mpsc::UnboundedReceiver<ClientMessage>,
    tx: Option<mpsc::UnboundedSender<InboundFrame>>,
    opened_url: Arc<Mutex<Option<String>>>,
}

impl MemoryPeer {
    /// Queue a JSON envelope for the client
    pub fn send_json(&self, json: impl Into<String>) -> bool {
        self.push(InboundFrame::Data(json.into().into_bytes()))
    }

    /// Queue a close frame for the client
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.push(InboundFrame::Closed {
            code,
            reason: reason.into(),
        })
    }

    /// End the inbound stream without a close frame
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    fn push(&self, frame: InboundFrame) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.rx.try_recv().ok()
    }

    /// Drain everything the client has written so far
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// URL passed to [`Connector::open`], once opened
    pub fn opened_url(&self) -> Option<String> {
        self.opened_url.lock().ok().and_then(|url| url.clone())
    }
}
