// MIT License - Copyright (c) 2026 Peter Wright
// tokio-tungstenite implementation of the socket seam

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error};

use crate::error::{EufyError, Result};
use crate::transport::{Connector, Frame, FrameSink, FrameStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with `tokio-tungstenite`. Built without a TLS backend, so only
/// plain `ws://` URLs are reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let (ws, _response) = connect_async(url).await.map_err(|e| {
            error!("WebSocket connect to {} failed: {}", url, e);
            EufyError::CannotConnect {
                reason: e.to_string(),
            }
        })?;

        debug!("WebSocket connected to {}", url);

        let (sink, stream) = ws.split();
        Ok((
            Box::new(WsWriter {
                sink,
                closed: false,
            }),
            Box::new(WsReader { stream }),
        ))
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(EufyError::ConnectionClosed);
        }
        self.sink.send(Message::Text(text.into())).await.map_err(|e| {
            self.closed = true;
            EufyError::ConnectionFailed {
                reason: e.to_string(),
            }
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink
            .close()
            .await
            .map_err(|e| EufyError::ConnectionFailed {
                reason: e.to_string(),
            })
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsReader {
    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Frame::Text(text.to_string())),
                Ok(Message::Binary(data)) => return Some(Frame::Binary(data.to_vec())),
                Ok(Message::Close(_)) => return Some(Frame::Close),
                // Control frames are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Frame::Error(e.to_string())),
            }
        }
    }
}
