// MIT License - Copyright (c) 2026 Peter Wright
// Websocket session: handshake, bootstrap and the receive loop

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::constants::{SET_API_SCHEMA_MESSAGE_ID, START_LISTENING_MESSAGE_ID};
use crate::driver::Driver;
use crate::error::{EufyError, Result};
use crate::protocol::{receive_json, Command, ServerMessage};
use crate::transport::command::CommandEngine;
use crate::transport::websocket::TungsteniteConnector;
use crate::transport::{Connector, FrameStream};
use crate::version::VersionInfo;

/// Lifecycle of a [`WebsocketClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket, or the handshake failed.
    Disconnected,
    /// Handshake done, schema negotiated, not yet listening.
    Connected,
    /// The receive loop is running.
    Listening,
    /// The receive loop has ended and the socket is closed.
    Closed,
}

/// A session with an eufy-security-ws server.
///
/// `connect` performs the version handshake, `listen` bootstraps the
/// [`Driver`] and then runs the receive loop until the socket closes. Commands
/// may be sent concurrently from other tasks while `listen` runs.
pub struct WebsocketClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    commands: CommandEngine,
    /// Read half, parked here between `connect` and `listen`
    reader: Mutex<Option<Box<dyn FrameStream>>>,
    state: RwLock<SessionState>,
    version: RwLock<Option<VersionInfo>>,
    driver: RwLock<Option<Arc<Driver>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WebsocketClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a client that opens its sockets through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            connector,
            commands: CommandEngine::new(),
            reader: Mutex::new(None),
            state: RwLock::new(SessionState::Disconnected),
            version: RwLock::new(None),
            driver: RwLock::new(None),
            shutdown_tx,
        }
    }

    /// Open the socket and negotiate the API schema.
    ///
    /// Fails with `InvalidServerVersion` (closing the socket) when the server's
    /// schema range does not overlap ours.
    pub async fn connect(&self) -> Result<()> {
        if self.connected() {
            debug!("Already connected to {}", self.config.url);
            return Ok(());
        }

        debug!("Connecting to websocket server {}", self.config.url);
        let (version, schema, stream) =
            match timeout(self.config.connect_timeout(), self.open()).await {
                Ok(Ok(opened)) => opened,
                Ok(Err(e)) => {
                    self.abort_connect().await;
                    return Err(e);
                }
                Err(_) => {
                    warn!("Timed out connecting to {}", self.config.url);
                    self.abort_connect().await;
                    return Err(EufyError::ConnectionTimeout);
                }
            };

        info!(
            "Connected to {} (Server {}, Driver {}, Using Schema {})",
            self.config.url, version.server_version, version.driver_version, schema
        );

        self.commands.set_schema_version(schema);
        *self.reader.lock().await = Some(stream);
        *self.version.write() = Some(version);
        *self.driver.write() = None;
        *self.state.write() = SessionState::Connected;
        self.shutdown_tx.send_replace(false);
        Ok(())
    }

    async fn open(&self) -> Result<(VersionInfo, u32, Box<dyn FrameStream>)> {
        let (sink, mut stream) = self.connector.connect(&self.config.url).await?;
        self.commands.attach(sink).await;

        let version = VersionInfo::from_message(receive_json(stream.as_mut()).await?)?;
        let schema = version.negotiate_schema()?;
        Ok((version, schema, stream))
    }

    async fn abort_connect(&self) {
        if let Err(e) = self.commands.close().await {
            debug!("Error closing socket after failed connect: {}", e);
        }
        *self.state.write() = SessionState::Disconnected;
    }

    /// Close the socket. A running `listen` then ends normally.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.commands.is_connected() {
            return Ok(());
        }

        debug!("Disconnecting from websocket server");
        self.commands.close().await?;

        // Not listening: nobody else will tidy up the parked reader
        if let Some(reader) = self.reader.lock().await.take() {
            drop(reader);
            *self.state.write() = SessionState::Disconnected;
        }
        Ok(())
    }

    /// Whether a socket is open and the handshake succeeded.
    pub fn connected(&self) -> bool {
        self.commands.is_connected()
            && matches!(
                self.state(),
                SessionState::Connected | SessionState::Listening
            )
    }

    /// Bootstrap the driver and run the receive loop.
    ///
    /// `driver_ready` receives the driver once the initial state is loaded,
    /// before any event is processed. Returns `Ok` when the server closes the
    /// socket; transport and message-format errors end the loop with `Err`.
    /// Either way pending commands are cancelled, the socket is closed and
    /// [`shutdown_complete`](Self::shutdown_complete) is signalled.
    pub async fn listen(&self, driver_ready: oneshot::Sender<Arc<Driver>>) -> Result<()> {
        if !self.connected() {
            return Err(EufyError::NotConnected);
        }
        let mut stream = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(EufyError::NotConnected)?;
        *self.state.write() = SessionState::Listening;

        let cleanup = ListenCleanup {
            client: self,
            finished: false,
        };
        let outcome = self.run(stream.as_mut(), driver_ready).await;
        cleanup.finish().await;

        match outcome {
            Err(EufyError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn run(
        &self,
        stream: &mut dyn FrameStream,
        driver_ready: oneshot::Sender<Arc<Driver>>,
    ) -> Result<()> {
        let schema_version = self.commands.schema_version();
        self.bootstrap_command(
            stream,
            &Command::SetApiSchema { schema_version },
            SET_API_SCHEMA_MESSAGE_ID,
        )
        .await?;

        let result = self
            .bootstrap_command(stream, &Command::StartListening, START_LISTENING_MESSAGE_ID)
            .await?;
        let state = result
            .get("state")
            .and_then(Value::as_object)
            .ok_or_else(|| EufyError::invalid_message("start_listening result without a state"))?;

        let driver = Arc::new(Driver::new(
            self.commands.clone(),
            state,
            self.config.event_channel_capacity,
        )?);
        *self.driver.write() = Some(Arc::clone(&driver));
        if driver_ready.send(Arc::clone(&driver)).is_err() {
            debug!("Driver ready receiver was dropped");
        }

        info!("Started listening to websocket server");

        loop {
            let msg = receive_json(stream).await?;
            self.handle_message(&driver, msg)?;
        }
    }

    /// Send one of the fixed-ID bootstrap commands and read frames until its
    /// result arrives.
    async fn bootstrap_command(
        &self,
        stream: &mut dyn FrameStream,
        command: &Command,
        message_id: &str,
    ) -> Result<Value> {
        let mut payload = command.to_payload();
        payload.insert("messageId".to_string(), Value::from(message_id));
        self.commands.send_json(&payload).await?;

        loop {
            match ServerMessage::from_value(receive_json(stream).await?)? {
                ServerMessage::Result(result) if result.message_id == message_id => {
                    return result.into_outcome();
                }
                ServerMessage::Result(result) => self.commands.resolve(result),
                other => debug!("Skipping message during bootstrap: {:?}", other),
            }
        }
    }

    fn handle_message(&self, driver: &Driver, msg: Value) -> Result<()> {
        match ServerMessage::from_value(msg)? {
            ServerMessage::Result(result) => self.commands.resolve(result),
            ServerMessage::Event(event) => driver.receive_event(&event)?,
            ServerMessage::Unknown {
                message_type,
                payload,
            } => debug!("Received message with unknown type {:?}: {}", message_type, payload),
        }
        Ok(())
    }

    fn mark_closed(&self) {
        *self.state.write() = SessionState::Closed;
        self.shutdown_tx.send_replace(true);
    }

    /// Send a command and wait for its result.
    pub async fn send_command(
        &self,
        payload: Map<String, Value>,
        require_schema: Option<u32>,
    ) -> Result<Value> {
        self.commands.send_command(payload, require_schema).await
    }

    /// Send a command without waiting for a result.
    pub async fn send_command_no_wait(
        &self,
        payload: Map<String, Value>,
        require_schema: Option<u32>,
    ) -> Result<()> {
        self.commands
            .send_command_no_wait(payload, require_schema)
            .await
    }

    /// Send a typed command and wait for its result.
    pub async fn send(&self, command: &Command) -> Result<Value> {
        self.commands.send(command).await
    }

    /// The driver, once `listen` has bootstrapped it.
    pub fn driver(&self) -> Option<Arc<Driver>> {
        self.driver.read().clone()
    }

    /// Server version info from the last handshake.
    pub fn version(&self) -> Option<VersionInfo> {
        self.version.read().clone()
    }

    /// Negotiated API schema.
    pub fn schema_version(&self) -> u32 {
        self.commands.schema_version()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Watch that flips to `true` when a `listen` loop has fully cleaned up.
    pub fn shutdown_complete(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Handle for sending commands from other tasks.
    pub fn commands(&self) -> CommandEngine {
        self.commands.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Tears the session down when `listen` ends, including when its future is
/// dropped mid-loop.
struct ListenCleanup<'a> {
    client: &'a WebsocketClient,
    finished: bool,
}

impl ListenCleanup<'_> {
    async fn finish(mut self) {
        debug!("Listen completed; cleaning up");
        if let Err(e) = self.client.commands.shutdown().await {
            debug!("Error closing socket: {}", e);
        }
        self.client.mark_closed();
        self.finished = true;
    }
}

impl Drop for ListenCleanup<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!("Listen aborted; cleaning up");
        let commands = self.client.commands.clone();
        commands.mark_disconnected();
        commands.cancel_pending();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = commands.close().await {
                    debug!("Error closing socket: {}", e);
                }
            });
        }
        self.client.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::transport::FrameSink;

    /// Connector whose connect never completes.
    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            std::future::pending().await
        }
    }

    /// Connector that always refuses.
    struct Refused;

    #[async_trait]
    impl Connector for Refused {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            Err(EufyError::CannotConnect {
                reason: "connection refused".to_string(),
            })
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .url("ws://127.0.0.1:3000")
            .connect_timeout_ms(1000)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let client = WebsocketClient::with_connector(config(), Arc::new(Unreachable));
        let started = tokio::time::Instant::now();
        let err = client.connect().await.unwrap_err();

        assert!(matches!(err, EufyError::ConnectionTimeout));
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let client = WebsocketClient::with_connector(config(), Arc::new(Refused));
        let err = client.connect().await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(err, EufyError::CannotConnect { .. }));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_idle_client() {
        let client = WebsocketClient::with_connector(config(), Arc::new(Refused));
        assert!(!client.connected());
        assert!(client.driver().is_none());
        assert!(client.version().is_none());
        assert!(!*client.shutdown_complete().borrow());
        client.disconnect().await.unwrap();

        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            client.listen(tx).await,
            Err(EufyError::NotConnected)
        ));
    }
}
