// MIT License - Copyright (c) 2026 Peter Wright
// Station/device monitor

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use eufy_security_ws::{
    get_server_version, ClientConfig, Driver, Entity, Event, EventKind, WebsocketClient,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "eufy-ws-monitor")]
#[command(about = "Log the stations, devices and events of an eufy-security-ws server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Print the server version handshake and exit
    #[arg(long)]
    probe: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    server: ServerToml,
}

#[derive(Debug, Deserialize)]
struct ServerToml {
    url: String,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_event_channel_capacity")]
    event_channel_capacity: usize,
}

fn default_connect_timeout() -> u64 {
    10000
}
fn default_reconnect_delay() -> u64 {
    10000
}
fn default_event_channel_capacity() -> usize {
    256
}

fn build_client_config(toml: &ServerToml) -> Result<ClientConfig> {
    // tokio-tungstenite is built without a TLS backend
    if toml.url.starts_with("wss://") {
        anyhow::bail!("TLS (wss://) is not supported, use a ws:// URL: {}", toml.url);
    }
    if !toml.url.starts_with("ws://") {
        anyhow::bail!("Server URL must start with ws://, got {}", toml.url);
    }
    Ok(ClientConfig::builder()
        .url(&toml.url)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .event_channel_capacity(toml.event_channel_capacity)
        .build())
}

/// Exponential backoff: base, 2x, 4x, 8x, then capped at 16x.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << attempt.saturating_sub(1).min(4))
}

// ---------------------------------------------------------------------------
// Logging helpers
// ---------------------------------------------------------------------------

fn log_driver(driver: &Driver) {
    info!(
        "Driver {} (connected={:?}, push={:?})",
        driver.version().unwrap_or_else(|| "unknown".to_string()),
        driver.connected(),
        driver.push_connected()
    );

    for station in driver.stations() {
        info!(
            "Station {} {:?} model={:?} alarm={} guard={}",
            station.serial_number(),
            station.name(),
            station.model(),
            station
                .alarm_mode_kind()
                .map_or("n/a", |mode| mode.description()),
            station
                .guard_mode_kind()
                .map_or("n/a", |mode| mode.description()),
        );
        for device in driver.devices_for_station(station.serial_number()) {
            info!(
                "  Device {} {:?} model={:?} enabled={:?}",
                device.serial_number(),
                device.name(),
                device.model(),
                device.enabled()
            );
        }
    }
}

fn log_event(event: &Event) {
    let when = event.timestamp().unwrap_or_else(Utc::now);
    let source = event.source().unwrap_or("driver");
    let serial = event.serial_number().unwrap_or("-");

    match event.kind() {
        Some(EventKind::PropertyChanged) => info!(
            "[{}] {} {}: {} = {}",
            when.to_rfc3339(),
            source,
            serial,
            event.name().unwrap_or("?"),
            event.value().cloned().unwrap_or_default()
        ),
        Some(kind) => info!("[{}] {} {}: {}", when.to_rfc3339(), source, serial, kind.as_str()),
        None => debug!(
            "[{}] {} {}: {} {:?}",
            when.to_rfc3339(),
            source,
            serial,
            event.event_type,
            event.data
        ),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=eufy_security_ws=debug).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;
    let client_config = build_client_config(&config.server)?;

    if cli.probe {
        let version = get_server_version(&client_config.url)
            .await
            .context("Failed to read server version")?;
        println!(
            "server {} driver {} schema {}..={}",
            version.server_version,
            version.driver_version,
            version.min_schema_version,
            version.max_schema_version
        );
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut attempt: u32 = 0;

    loop {
        info!("Connecting to eufy-security-ws at {}", client_config.url);
        let client = Arc::new(WebsocketClient::new(client_config.clone()));

        if let Err(e) = client.connect().await {
            if !e.is_transport() {
                return Err(e).context("Cannot use eufy-security-ws server");
            }
            attempt += 1;
            let delay = backoff_delay(client_config.reconnect_delay(), attempt);
            warn!("Connection error (attempt {}): {}; retrying in {:?}", attempt, e, delay);
            let stop = tokio::select! {
                _ = sleep(delay) => false,
                _ = tokio::signal::ctrl_c() => true,
                _ = sigterm.recv() => true,
            };
            if stop {
                break;
            }
            continue;
        }
        attempt = 0;

        // Task 1: receive loop
        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = Arc::clone(&client);
        let mut listen_handle = tokio::spawn(async move { listener.listen(ready_tx).await });

        // Task 2: event logger
        let event_handle = tokio::spawn(async move {
            let Ok(driver) = ready_rx.await else {
                return;
            };
            log_driver(&driver);

            let mut rx = driver.subscribe();
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(n)) => warn!("Event logger lagged, skipped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        // Wait for the session to end or a signal
        let stop = tokio::select! {
            outcome = &mut listen_handle => {
                match outcome {
                    Ok(Ok(())) => {
                        warn!("Server closed the connection");
                        false
                    }
                    Ok(Err(e)) if e.is_transport() => {
                        warn!("Connection lost: {}", e);
                        false
                    }
                    Ok(Err(e)) => {
                        event_handle.abort();
                        return Err(e).context("Listening failed");
                    }
                    Err(e) => {
                        error!("Listen task failed: {}", e);
                        false
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                true
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                true
            }
        };

        if stop {
            let mut done = client.shutdown_complete();
            if let Err(e) = client.disconnect().await {
                warn!("Error disconnecting: {}", e);
            }
            if timeout(Duration::from_secs(5), done.wait_for(|complete| *complete))
                .await
                .is_err()
            {
                warn!("Timed out waiting for the receive loop to finish");
            }
        }

        event_handle.abort();
        listen_handle.abort();

        if stop {
            break;
        }

        let delay = client_config.reconnect_delay();
        info!("Reconnecting in {:?}...", delay);
        sleep(delay).await;
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "ws://192.168.1.10:3000"
            connect_timeout_ms = 2000
            "#,
        )
        .unwrap();
        let client_config = build_client_config(&config.server).unwrap();

        assert_eq!(client_config.url, "ws://192.168.1.10:3000");
        assert_eq!(client_config.connect_timeout_ms, 2000);
        assert_eq!(client_config.reconnect_delay_ms, 10000);
        assert_eq!(client_config.event_channel_capacity, 256);
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "http://192.168.1.10:3000"
            "#,
        )
        .unwrap();
        assert!(build_client_config(&config.server).is_err());
    }

    #[test]
    fn test_rejects_tls_url() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "wss://192.168.1.10:3000"
            "#,
        )
        .unwrap();
        let err = build_client_config(&config.server).unwrap_err();
        assert!(err.to_string().contains("wss://"));
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 9), Duration::from_secs(16));
    }
}
