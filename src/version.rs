// MIT License - Copyright (c) 2026 Peter Wright
// Server version handshake and schema negotiation

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::constants::{MAX_SERVER_SCHEMA_VERSION, MIN_SERVER_SCHEMA_VERSION};
use crate::error::{EufyError, Result};
use crate::protocol::receive_json;
use crate::transport::websocket::TungsteniteConnector;
use crate::transport::Connector;

/// Version information sent by the server as the first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub driver_version: String,
    pub server_version: String,
    #[serde(default)]
    pub min_schema_version: u32,
    #[serde(default)]
    pub max_schema_version: u32,
}

impl VersionInfo {
    /// Parse a handshake message. Missing schema bounds default to 0.
    pub fn from_message(msg: Value) -> Result<Self> {
        serde_json::from_value(msg).map_err(|e| EufyError::InvalidMessage {
            details: format!("Invalid version handshake: {e}"),
        })
    }

    /// Pick the schema to use with this server.
    ///
    /// The ranges must overlap; the result is the highest version both sides
    /// support.
    pub fn negotiate_schema(&self) -> Result<u32> {
        if self.max_schema_version < MIN_SERVER_SCHEMA_VERSION
            || self.min_schema_version > MAX_SERVER_SCHEMA_VERSION
        {
            return Err(EufyError::InvalidServerVersion {
                details: format!(
                    "eufy-security-ws version is incompatible: {} (schema {}..={}). \
                     This client supports API schema {}..={}.",
                    self.server_version,
                    self.min_schema_version,
                    self.max_schema_version,
                    MIN_SERVER_SCHEMA_VERSION,
                    MAX_SERVER_SCHEMA_VERSION,
                ),
            });
        }
        Ok(MAX_SERVER_SCHEMA_VERSION.min(self.max_schema_version))
    }
}

/// Connect, read the version handshake and disconnect again.
pub async fn get_server_version(url: &str) -> Result<VersionInfo> {
    get_server_version_with(&TungsteniteConnector, url).await
}

/// [`get_server_version`] over a caller-supplied connector.
pub async fn get_server_version_with(connector: &dyn Connector, url: &str) -> Result<VersionInfo> {
    let (mut sink, mut stream) = connector.connect(url).await?;
    let outcome = match receive_json(stream.as_mut()).await {
        Ok(msg) => VersionInfo::from_message(msg),
        Err(e) => Err(e),
    };

    if let Err(e) = sink.close().await {
        debug!("Error closing version check connection: {}", e);
    }
    outcome
}
