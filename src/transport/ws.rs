use super::{CloseReason, Connector, FrameSink, FrameSource, InboundFrame, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone)]
pub struct WsConnector {
    max_message_size: usize,
    handshake_timeout: Duration,
}

impl WsConnector {
    /// `max_message_size` bounds a single inbound message
    ///
    /// A response larger than this fails the read instead of being
    /// delivered, which ends the receive loop with a transport error.
    /// `handshake_timeout` covers TCP connect, TLS and the upgrade.
    pub fn new(max_message_size: usize, handshake_timeout: Duration) -> Self {
        Self {
            max_message_size,
            handshake_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);

        debug!(
            "Connecting to {}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        );

        let connect =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(config), false);
        let connected = tokio::time::timeout(self.handshake_timeout, connect)
            .await
            .map_err(|_| {
                warn!("Handshake timed out after {:?}", self.handshake_timeout);
                TransportError::HandshakeTimeout(self.handshake_timeout)
            })?;

        let (stream, response) = match connected {
            Ok(connected) => connected,
            Err(tungstenite::Error::Http(response)) => {
                let body = response
                    .body()
                    .as_deref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                return Err(TransportError::Rejected {
                    status: response.status().as_u16(),
                    body,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!("WebSocket handshake complete (HTTP {})", response.status());

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink.send(Message::text(text)).await.map_err(map_error)
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        };

        match self.sink.send(Message::Close(Some(frame))).await.map_err(map_error) {
            Ok(()) | Err(TransportError::Closed) => {}
            Err(e) => return Err(e),
        }

        match self.sink.close().await.map_err(map_error) {
            Ok(()) | Err(TransportError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait::async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(Ok(InboundFrame::Data(text.as_bytes().to_vec())));
                }
                Ok(Message::Binary(data)) => return Some(Ok(InboundFrame::Data(data.to_vec()))),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(InboundFrame::Closed { code, reason }));
                }
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => {
                    return match map_error(e) {
                        TransportError::Closed => None,
                        other => Some(Err(other)),
                    };
                }
            }
        }
    }
}

fn map_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::WebSocket(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accepts the socket, never answers the upgrade
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let connector = WsConnector::new(1 << 20, Duration::from_millis(200));
        let url = Url::parse(&format!("ws://{}/sos", addr)).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), connector.open(&url))
            .await
            .expect("open must give up on its own");

        match result {
            Err(TransportError::HandshakeTimeout(after)) => {
                assert_eq!(after, Duration::from_millis(200))
            }
            Err(other) => panic!("expected handshake timeout, got {}", other),
            Ok(_) => panic!("expected handshake timeout, got a connection"),
        }

        server.abort();
    }
}
