// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy for the websocket client

use std::fmt;

/// Where an event claims to come from, used when routing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntitySource {
    Station,
    Device,
}

impl EntitySource {
    /// The wire string representation ("station", "device").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Station => "station",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in the eufy-security-ws client.
#[derive(Debug, thiserror::Error)]
pub enum EufyError {
    #[error("Cannot connect to websocket server: {reason}")]
    CannotConnect { reason: String },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection was closed")]
    ConnectionClosed,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Invalid message: {details}")]
    InvalidMessage { details: String },

    #[error("Invalid server version: {details}")]
    InvalidServerVersion { details: String },

    #[error("Command failed: {error_code}")]
    FailedCommand {
        message_id: String,
        error_code: String,
    },

    #[error("Not connected to websocket server")]
    NotConnected,

    #[error("Command cancelled before a result arrived")]
    Cancelled,

    #[error("Unknown {entity} serial number: {serial_number}")]
    UnknownEntity {
        entity: EntitySource,
        serial_number: String,
    },
}

impl EufyError {
    /// Whether this error came from the socket layer.
    ///
    /// The client never retries on its own; outer callers use this to decide
    /// whether a fresh connection attempt makes sense.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EufyError::CannotConnect { .. }
                | EufyError::ConnectionTimeout
                | EufyError::ConnectionClosed
                | EufyError::ConnectionFailed { .. }
        )
    }

    pub(crate) fn invalid_message(details: impl Into<String>) -> Self {
        EufyError::InvalidMessage {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for EufyError {
    fn from(err: serde_json::Error) -> Self {
        EufyError::InvalidMessage {
            details: format!("Received invalid JSON: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, EufyError>;
