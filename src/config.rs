// MIT License - Copyright (c) 2026 Peter Wright
// Client configuration

use std::time::Duration;

/// Configuration for connecting to an eufy-security-ws server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket URL of the server (`ws://`)
    pub url: String,
    /// Time allowed for the socket open and version handshake (default: 10000)
    pub connect_timeout_ms: u64,
    /// Capacity of the driver's broadcast event channel (default: 256)
    pub event_channel_capacity: usize,
    /// Reconnection delay in milliseconds (base delay for exponential backoff).
    /// The client never reconnects by itself; this is for the caller's loop.
    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000".to_string(),
            connect_timeout_ms: 10000,
            event_channel_capacity: 256,
            reconnect_delay_ms: 10000,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .url("ws://10.0.0.5:3000")
            .connect_timeout_ms(2500)
            .event_channel_capacity(32)
            .build();

        assert_eq!(config.url, "ws://10.0.0.5:3000");
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.event_channel_capacity, 32);
        assert_eq!(config.reconnect_delay_ms, 10000);
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::builder().build();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.connect_timeout_ms, 10000);
        assert_eq!(config.event_channel_capacity, 256);
    }
}
