// MIT License - Copyright (c) 2026 Peter Wright
// Client library for eufy-security-ws
//
//! # eufy-security-ws
//!
//! Websocket client for an [eufy-security-ws] server: negotiates the API
//! schema, correlates commands with their results over a single socket and
//! keeps a local copy of the driver, its stations and devices in sync with
//! the events the server pushes.
//!
//! [eufy-security-ws]: https://github.com/bropat/eufy-security-ws
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use eufy_security_ws::{ClientConfig, Entity, WebsocketClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .url("ws://192.168.0.100:3000")
//!         .build();
//!
//!     let client = Arc::new(WebsocketClient::new(config));
//!     client.connect().await?;
//!
//!     let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
//!     let listener = Arc::clone(&client);
//!     let listen = tokio::spawn(async move { listener.listen(ready_tx).await });
//!
//!     let driver = ready_rx.await?;
//!     for station in driver.stations() {
//!         println!("Station {}: {:?}", station.serial_number(), station.name());
//!     }
//!
//!     let mut events = driver.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {} {:?}", event.event_type, event.data);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect().await?;
//!     listen.await??;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod devices;
pub mod driver;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod version;

// Re-exports for convenience
pub use client::{SessionState, WebsocketClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use constants::{AlarmMode, GuardMode, MAX_SERVER_SCHEMA_VERSION, MIN_SERVER_SCHEMA_VERSION};
pub use devices::{Device, Entity, PropertyBag, Station};
pub use driver::Driver;
pub use error::{EntitySource, EufyError, Result};
pub use event::{Event, EventBus, EventKind, EventReceiver, Subscription};
pub use protocol::Command;
pub use transport::command::CommandEngine;
pub use version::{get_server_version, VersionInfo};
