//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use rc_core::error::{RcError, RcResult};

use crate::frame::decode_binary;
use crate::transport::{Connector, FrameSink, FrameSource, TransportEvent, TransportPair};

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for `ws://` and `wss://` relays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, address: &str) -> RcResult<TransportPair> {
        if !(address.starts_with("ws://") || address.starts_with("wss://")) {
            return Err(RcError::InvalidAddress(address.to_string()));
        }

        let (stream, response) = tokio_tungstenite::connect_async(address)
            .await
            .map_err(|e| RcError::Connect(e.to_string()))?;
        debug!("websocket handshake with {address} returned {}", response.status());

        let (write, read) = stream.split();
        Ok(TransportPair {
            sink: Box::new(WebSocketSink { inner: write }),
            source: Box::new(WebSocketSource { inner: read }),
        })
    }
}

struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: &str) -> RcResult<()> {
        self.inner
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| RcError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> RcResult<()> {
        self.inner
            .send(Message::Close(None))
            .await
            .map_err(|e| RcError::TransportClosed(e.to_string()))
    }
}

struct WebSocketSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => return TransportEvent::Frame(decode_binary(&data)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("peer closed: {frame:?}");
                    return TransportEvent::Closed;
                }
                // Ping replies are queued by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => return TransportEvent::Closed,
            }
        }
    }
}
