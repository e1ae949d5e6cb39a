// MIT License - Copyright (c) 2026 Peter Wright
// Command/result correlation over a shared socket

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error};
use uuid::Uuid;

use crate::constants::MAX_SERVER_SCHEMA_VERSION;
use crate::error::{EufyError, Result};
use crate::protocol::{Command, ResultMessage};
use crate::transport::FrameSink;

type PendingMap = HashMap<String, oneshot::Sender<Result<Value>>>;

/// Tracks pending commands and routes results back to callers via oneshot channels.
///
/// Cheap to clone; every clone shares the same socket writer and pending map.
/// Stations and devices hold a clone to issue their own queries.
#[derive(Clone)]
pub struct CommandEngine {
    /// Map of pending message IDs to their result senders
    pending: Arc<parking_lot::Mutex<PendingMap>>,
    /// Socket writer half, absent until connected
    writer: Arc<Mutex<Option<Box<dyn FrameSink>>>>,
    /// Negotiated API schema
    schema_version: Arc<AtomicU32>,
    /// Whether the socket is open
    connected: Arc<AtomicBool>,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEngine {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            writer: Arc::new(Mutex::new(None)),
            schema_version: Arc::new(AtomicU32::new(MAX_SERVER_SCHEMA_VERSION)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the writer of a freshly opened socket.
    pub async fn attach(&self, sink: Box<dyn FrameSink>) {
        *self.writer.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::SeqCst)
    }

    pub fn set_schema_version(&self, version: u32) {
        self.schema_version.store(version, Ordering::SeqCst);
    }

    /// Number of commands still awaiting a result.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Write one JSON object to the socket.
    pub async fn send_json(&self, payload: &Map<String, Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(EufyError::NotConnected);
        }

        let text = serde_json::to_string(payload)?;
        debug!("Sending data to websocket server: {}", text);

        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(EufyError::NotConnected)?;
        sink.send_text(text).await.map_err(|e| {
            error!("Failed to write command: {}", e);
            e
        })
    }

    /// Send a command and wait for its result.
    ///
    /// Fails with `InvalidServerVersion` before anything is written when the
    /// negotiated schema is below `require_schema`. The pending entry is removed
    /// on every exit path, including the caller dropping the future.
    pub async fn send_command(
        &self,
        mut payload: Map<String, Value>,
        require_schema: Option<u32>,
    ) -> Result<Value> {
        self.check_schema(require_schema)?;

        let message_id = new_message_id();
        payload.insert("messageId".to_string(), Value::from(message_id.as_str()));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(message_id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            message_id: &message_id,
        };

        self.send_json(&payload).await?;

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("Command {} cancelled", message_id);
                Err(EufyError::Cancelled)
            }
        }
    }

    /// Send a command without waiting for (or registering) a result.
    pub async fn send_command_no_wait(
        &self,
        mut payload: Map<String, Value>,
        require_schema: Option<u32>,
    ) -> Result<()> {
        self.check_schema(require_schema)?;
        payload.insert("messageId".to_string(), Value::from(new_message_id()));
        self.send_json(&payload).await
    }

    /// Send a typed command and wait for its result.
    pub async fn send(&self, command: &Command) -> Result<Value> {
        self.send_command(command.to_payload(), command.required_schema())
            .await
    }

    /// Hand a result frame to whoever is waiting for it. Results for unknown
    /// (or already abandoned) IDs are dropped.
    pub fn resolve(&self, result: ResultMessage) {
        let Some(tx) = self.pending.lock().remove(&result.message_id) else {
            return;
        };
        let _ = tx.send(result.into_outcome());
    }

    /// Drop every pending sender so all waiting callers observe `Cancelled`.
    pub fn cancel_pending(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Cancelling {} pending command(s)", drained.len());
        }
    }

    /// Stop accepting commands. Anything sent afterwards fails with
    /// `NotConnected` before it is written.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Tear the session down: refuse new commands, cancel every pending one,
    /// then close the socket.
    ///
    /// The flag is cleared before the drain, so a command registering
    /// concurrently is either drained here or refused by `send_json`.
    pub async fn shutdown(&self) -> Result<()> {
        self.mark_disconnected();
        self.cancel_pending();
        self.close().await
    }

    /// Close the socket. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.mark_disconnected();
        let sink = self.writer.lock().await.take();
        match sink {
            Some(mut sink) if !sink.is_closed() => sink.close().await,
            _ => Ok(()),
        }
    }

    fn check_schema(&self, require_schema: Option<u32>) -> Result<()> {
        match require_schema {
            Some(required) if required > self.schema_version() => {
                Err(EufyError::InvalidServerVersion {
                    details: format!(
                        "Command unavailable due to an incompatible eufy-security-ws version. \
                         Update eufy-security-ws to a version that supports a minimum API \
                         schema of {required}."
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Removes a pending entry when the awaiting future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a parking_lot::Mutex<PendingMap>,
    message_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<parking_lot::Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    async fn attached_engine() -> (CommandEngine, RecordingSink) {
        let engine = CommandEngine::new();
        let sink = RecordingSink::default();
        engine.attach(Box::new(sink.clone())).await;
        (engine, sink)
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn wait_for_frame(sink: &RecordingSink) -> Value {
        for _ in 0..100 {
            if let Some(text) = sink.sent.lock().last().cloned() {
                return serde_json::from_str(&text).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no frame sent");
    }

    #[tokio::test]
    async fn test_not_connected() {
        let engine = CommandEngine::new();
        let err = engine
            .send_command(payload(json!({"command": "test"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EufyError::NotConnected));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_schema_gate_sends_nothing() {
        let (engine, sink) = attached_engine().await;
        engine.set_schema_version(1);

        let err = engine
            .send_command(payload(json!({"command": "test"})), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EufyError::InvalidServerVersion { .. }));

        let err = engine
            .send_command_no_wait(payload(json!({"command": "test"})), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EufyError::InvalidServerVersion { .. }));

        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_routes_result() {
        let (engine, sink) = attached_engine().await;
        let task = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .send_command(payload(json!({"command": "test"})), Some(1))
                    .await
            })
        };

        let frame = wait_for_frame(&sink).await;
        let message_id = frame["messageId"].as_str().unwrap().to_string();
        assert_eq!(message_id.len(), 32);
        assert_eq!(engine.pending_count(), 1);

        // unknown IDs are ignored
        engine.resolve(ResultMessage {
            message_id: "nobody".to_string(),
            success: true,
            result: None,
            error_code: None,
        });
        engine.resolve(ResultMessage {
            message_id,
            success: true,
            result: Some(json!({"ok": true})),
            error_code: None,
        });

        assert_eq!(task.await.unwrap().unwrap(), json!({"ok": true}));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let (engine, sink) = attached_engine().await;
        let task = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .send(&Command::StationGetProperties {
                        serial_number: "S1".to_string(),
                    })
                    .await
            })
        };

        let frame = wait_for_frame(&sink).await;
        assert_eq!(frame["command"], "station.get_properties");
        engine.cancel_pending();

        assert!(matches!(task.await.unwrap(), Err(EufyError::Cancelled)));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_deregisters() {
        let (engine, sink) = attached_engine().await;
        let fut = engine.send_command(payload(json!({"command": "test"})), None);
        let _ = tokio::time::timeout(Duration::from_millis(20), fut).await;

        assert_eq!(sink.sent.lock().len(), 1);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_after_mark_disconnected_is_refused() {
        let (engine, sink) = attached_engine().await;
        engine.mark_disconnected();

        let err = engine
            .send_command(payload(json!({"command": "test"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EufyError::NotConnected));
        assert_eq!(engine.pending_count(), 0);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_leaves_no_command_waiting() {
        for _ in 0..50 {
            let (engine, _sink) = attached_engine().await;

            let callers: Vec<_> = (0..8)
                .map(|_| {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine
                            .send_command(payload(json!({"command": "test"})), None)
                            .await
                    })
                })
                .collect();
            let closer = {
                let engine = engine.clone();
                tokio::spawn(async move { engine.shutdown().await })
            };

            closer.await.unwrap().unwrap();
            for caller in callers {
                let outcome = tokio::time::timeout(Duration::from_secs(2), caller)
                    .await
                    .expect("command still waiting after shutdown")
                    .unwrap();
                assert!(matches!(
                    outcome,
                    Err(EufyError::Cancelled) | Err(EufyError::NotConnected)
                ));
            }
            assert_eq!(engine.pending_count(), 0);
            assert!(!engine.is_connected());
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (engine, sink) = attached_engine().await;
        engine.close().await.unwrap();
        engine.close().await.unwrap();

        assert!(sink.is_closed());
        assert!(!engine.is_connected());
        let err = engine
            .send_command_no_wait(payload(json!({"command": "test"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EufyError::NotConnected));
    }
}
