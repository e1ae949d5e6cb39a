// MIT License - Copyright (c) 2026 Peter Wright
// Socket seam between the session and the websocket library

pub mod command;
pub mod websocket;

use async_trait::async_trait;

use crate::error::Result;

/// A frame received from the socket, reduced to what the session cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// The socket reported a read error.
    Error(String),
    /// The peer closed the connection.
    Close,
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send a single text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Read half of a connection. Only the receive loop ever reads from it.
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, or `None` once the socket is gone.
    async fn next_frame(&mut self) -> Option<Frame>;
}

/// Opens connections. The default is [`websocket::TungsteniteConnector`];
/// tests plug in an in-memory implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}
