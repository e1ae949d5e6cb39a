// MIT License - Copyright (c) 2026 Peter Wright
// Wire format: outgoing commands and incoming server messages

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::SIZE_PARSE_JSON_EXECUTOR;
use crate::error::{EufyError, Result};
use crate::event::Event;
use crate::transport::{Frame, FrameStream};

/// Commands this client sends to the websocket server.
///
/// Every command is a JSON object `{command, messageId, ...fields}`. The
/// `messageId` is attached by the sender, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `set_api_schema`: select the API schema for this session.
    SetApiSchema { schema_version: u32 },
    /// `start_listening`: subscribe to events; the result carries the full
    /// driver state.
    StartListening,
    /// `station.get_properties`
    StationGetProperties { serial_number: String },
    /// `station.get_properties_metadata`
    StationGetPropertiesMetadata { serial_number: String },
    /// `device.get_properties`
    DeviceGetProperties { serial_number: String },
    /// `device.get_properties_metadata`
    DeviceGetPropertiesMetadata { serial_number: String },
    /// Any other server command, with its extra fields passed through.
    Custom {
        command: String,
        fields: Map<String, Value>,
        required_schema: Option<u32>,
    },
}

impl Command {
    /// The wire command name.
    pub fn name(&self) -> &str {
        match self {
            Command::SetApiSchema { .. } => "set_api_schema",
            Command::StartListening => "start_listening",
            Command::StationGetProperties { .. } => "station.get_properties",
            Command::StationGetPropertiesMetadata { .. } => "station.get_properties_metadata",
            Command::DeviceGetProperties { .. } => "device.get_properties",
            Command::DeviceGetPropertiesMetadata { .. } => "device.get_properties_metadata",
            Command::Custom { command, .. } => command,
        }
    }

    /// Minimum negotiated schema the server must speak for this command.
    pub fn required_schema(&self) -> Option<u32> {
        match self {
            Command::Custom {
                required_schema, ..
            } => *required_schema,
            _ => None,
        }
    }

    /// Build the JSON payload, without a `messageId`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("command".to_string(), Value::from(self.name()));

        match self {
            Command::SetApiSchema { schema_version } => {
                payload.insert("schemaVersion".to_string(), Value::from(*schema_version));
            }
            Command::StartListening => {}
            Command::StationGetProperties { serial_number }
            | Command::StationGetPropertiesMetadata { serial_number }
            | Command::DeviceGetProperties { serial_number }
            | Command::DeviceGetPropertiesMetadata { serial_number } => {
                payload.insert("serialNumber".to_string(), Value::from(serial_number.as_str()));
            }
            Command::Custom { fields, .. } => {
                for (key, value) in fields {
                    if key != "command" && key != "messageId" {
                        payload.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        payload
    }
}

/// A `result` frame answering an earlier command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub message_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl ResultMessage {
    /// Success yields the result payload (`Null` when absent); failure yields
    /// `FailedCommand` with the server's error code.
    pub fn into_outcome(self) -> Result<Value> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(EufyError::FailedCommand {
                message_id: self.message_id,
                error_code: self.error_code.unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }
}

/// An incoming frame, classified by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Result(ResultMessage),
    Event(Event),
    /// Any other message type; ignored by the receive loop.
    Unknown {
        message_type: Option<String>,
        payload: Value,
    },
}

impl ServerMessage {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(EufyError::invalid_message("Received non-object message"));
        };

        let message_type = object.get("type").and_then(Value::as_str).map(str::to_string);
        match message_type.as_deref() {
            Some("result") => {
                let result: ResultMessage = serde_json::from_value(Value::Object(object))?;
                Ok(ServerMessage::Result(result))
            }
            Some("event") => match object.remove("event") {
                Some(Value::Object(data)) => {
                    Ok(ServerMessage::Event(Event::from_envelope_data(data)?))
                }
                _ => Err(EufyError::invalid_message("Event message without an event object")),
            },
            _ => Ok(ServerMessage::Unknown {
                message_type,
                payload: Value::Object(object),
            }),
        }
    }
}

/// Decode a text frame, moving large payloads off the receive loop.
pub async fn decode_text(text: String) -> Result<Value> {
    if text.len() > SIZE_PARSE_JSON_EXECUTOR {
        tokio::task::spawn_blocking(move || serde_json::from_str::<Value>(&text))
            .await
            .map_err(|e| EufyError::invalid_message(format!("JSON decode task failed: {e}")))?
            .map_err(EufyError::from)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

/// Read the next frame and decode it as JSON.
///
/// A close (or an ended stream) is `ConnectionClosed`, a socket error is
/// `ConnectionFailed`, and a binary frame is `InvalidMessage`.
pub async fn receive_json(stream: &mut dyn FrameStream) -> Result<Value> {
    match stream.next_frame().await {
        None | Some(Frame::Close) => Err(EufyError::ConnectionClosed),
        Some(Frame::Error(reason)) => Err(EufyError::ConnectionFailed { reason }),
        Some(Frame::Binary(_)) => Err(EufyError::invalid_message("Received non-text message")),
        Some(Frame::Text(text)) => {
            let value = decode_text(text).await?;
            debug!("Received data from websocket server: {}", value);
            Ok(value)
        }
    }
}
