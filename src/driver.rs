// MIT License - Copyright (c) 2026 Peter Wright
// Driver: root of the station/device graph and event router

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::devices::{Device, Entity, Station};
use crate::error::{EntitySource, EufyError, Result};
use crate::event::{
    event_channel, Event, EventBus, EventHandler, EventKind, EventProtocol, EventReceiver,
    EventSender,
};
use crate::transport::command::CommandEngine;

/// The server-side driver and everything it knows about.
///
/// Built once from the `start_listening` state. The set of stations and
/// devices never changes afterwards; events only mutate their properties.
///
/// # Example
///
/// ```no_run
/// # async fn example(driver: std::sync::Arc<eufy_security_ws::Driver>) {
/// let mut events = driver.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("Event: {} {:?}", event.event_type, event.data);
///     }
/// });
///
/// for station in driver.stations() {
///     println!("Station {:?} mode={:?}", station, station.alarm_mode_kind());
/// }
/// # }
/// ```
pub struct Driver {
    /// Last known `driver` object of the state
    state: RwLock<Map<String, Value>>,
    stations: HashMap<String, Arc<Station>>,
    devices: HashMap<String, Arc<Device>>,
    events: EventBus,
    event_tx: EventSender,
}

const DRIVER_HANDLERS: &[(EventKind, EventHandler<Driver>)] = &[
    (EventKind::Connected, Driver::handle_connected),
    (EventKind::Disconnected, Driver::handle_disconnected),
    (EventKind::PushConnected, Driver::handle_push_connected),
    (EventKind::PushDisconnected, Driver::handle_push_disconnected),
];

impl Driver {
    /// Build the graph from the `state` object of the `start_listening` result:
    /// `{driver: {...}, stations: [...], devices: [...]}`.
    ///
    /// Missing `stations`/`devices` arrays count as empty.
    pub fn new(
        commands: CommandEngine,
        state: &Map<String, Value>,
        event_channel_capacity: usize,
    ) -> Result<Self> {
        let driver_state = match state.get("driver") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(EufyError::invalid_message("Driver state is not an object")),
        };

        let mut stations = HashMap::new();
        for station_state in entity_states(state, "stations")? {
            let station = Station::new(commands.clone(), station_state)?;
            stations.insert(station.serial_number().to_string(), Arc::new(station));
        }

        let mut devices = HashMap::new();
        for device_state in entity_states(state, "devices")? {
            let device = Device::new(commands.clone(), device_state)?;
            devices.insert(device.serial_number().to_string(), Arc::new(device));
        }

        info!(
            "Driver ready with {} station(s) and {} device(s)",
            stations.len(),
            devices.len()
        );

        let (event_tx, _event_rx) = event_channel(event_channel_capacity.max(1));
        Ok(Self {
            state: RwLock::new(driver_state),
            stations,
            devices,
            events: EventBus::new(),
            event_tx,
        })
    }

    /// Route an event to the entity it names (or to the driver itself), then
    /// emit it on the driver's bus and broadcast channel.
    ///
    /// An event for a serial number the driver does not know is an
    /// `UnknownEntity` error and is not emitted.
    pub fn receive_event(&self, event: &Event) -> Result<()> {
        match event.source() {
            Some("station") => {
                let serial = routing_serial(event)?;
                let station = self.stations.get(serial).ok_or_else(|| {
                    EufyError::UnknownEntity {
                        entity: EntitySource::Station,
                        serial_number: serial.to_string(),
                    }
                })?;
                station.receive_event(event);
            }
            Some("device") => {
                let serial = routing_serial(event)?;
                let device = self.devices.get(serial).ok_or_else(|| EufyError::UnknownEntity {
                    entity: EntitySource::Device,
                    serial_number: serial.to_string(),
                })?;
                device.receive_event(event);
            }
            _ => self.handle_event_protocol(event),
        }

        self.events.emit(&event.event_type, &event.data);
        // No receivers is fine
        let _ = self.event_tx.send(event.clone());
        Ok(())
    }

    /// Callback bus carrying every routed event by type.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to every routed event.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn stations(&self) -> Vec<Arc<Station>> {
        self.stations.values().cloned().collect()
    }

    pub fn station(&self, serial_number: &str) -> Option<Arc<Station>> {
        self.stations.get(serial_number).cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.values().cloned().collect()
    }

    pub fn device(&self, serial_number: &str) -> Option<Arc<Device>> {
        self.devices.get(serial_number).cloned()
    }

    /// Devices whose `stationSerialNumber` names this station.
    pub fn devices_for_station(&self, station_serial_number: &str) -> Vec<Arc<Device>> {
        self.devices
            .values()
            .filter(|d| d.station_serial_number().as_deref() == Some(station_serial_number))
            .cloned()
            .collect()
    }

    /// Whether the driver is connected to the cloud.
    pub fn connected(&self) -> Option<bool> {
        self.state.read().get("connected").and_then(Value::as_bool)
    }

    /// Whether the driver is connected to push notifications.
    pub fn push_connected(&self) -> Option<bool> {
        self.state.read().get("pushConnected").and_then(Value::as_bool)
    }

    /// The driver library version.
    pub fn version(&self) -> Option<String> {
        self.state
            .read()
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn set_flag(&self, key: &str, value: bool) {
        self.state.write().insert(key.to_string(), Value::Bool(value));
    }

    fn handle_connected(&self, _: &Event) {
        debug!("Driver connected");
        self.set_flag("connected", true);
    }

    fn handle_disconnected(&self, _: &Event) {
        debug!("Driver disconnected");
        self.set_flag("connected", false);
    }

    fn handle_push_connected(&self, _: &Event) {
        self.set_flag("pushConnected", true);
    }

    fn handle_push_disconnected(&self, _: &Event) {
        self.set_flag("pushConnected", false);
    }
}

impl EventProtocol for Driver {
    fn event_handlers() -> &'static [(EventKind, EventHandler<Self>)] {
        DRIVER_HANDLERS
    }
}

fn routing_serial(event: &Event) -> Result<&str> {
    event.serial_number().ok_or_else(|| {
        EufyError::invalid_message(format!(
            "{} event without a serialNumber",
            event.source().unwrap_or("unknown")
        ))
    })
}

fn entity_states(state: &Map<String, Value>, key: &str) -> Result<Vec<Map<String, Value>>> {
    match state.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(EufyError::invalid_message(format!(
                    "Entry in `{key}` is not an object"
                ))),
            })
            .collect(),
        Some(_) => Err(EufyError::invalid_message(format!("`{key}` is not an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn driver() -> Driver {
        let state = object(json!({
            "driver": {"version": "0.8.2", "connected": true, "pushConnected": false},
            "stations": [
                {"name": "Home Base", "serialNumber": "S1", "currentMode": 1},
            ],
            "devices": [
                {"name": "Front Door", "serialNumber": "D1", "stationSerialNumber": "S1"},
                {"name": "Garage", "serialNumber": "D2", "stationSerialNumber": "S2"},
            ],
        }));
        Driver::new(CommandEngine::new(), &state, 16).unwrap()
    }

    fn event(value: Value) -> Event {
        Event::from_envelope_data(object(value)).unwrap()
    }

    #[test]
    fn test_build_from_state() {
        let driver = driver();
        assert_eq!(driver.stations().len(), 1);
        assert_eq!(driver.devices().len(), 2);
        assert!(driver.station("S1").is_some());
        assert!(driver.device("D1").is_some());
        assert_eq!(driver.version().as_deref(), Some("0.8.2"));
        assert_eq!(driver.connected(), Some(true));
        assert_eq!(driver.push_connected(), Some(false));

        let attached = driver.devices_for_station("S1");
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].serial_number(), "D1");
    }

    #[test]
    fn test_empty_state() {
        let driver = Driver::new(CommandEngine::new(), &Map::new(), 16).unwrap();
        assert!(driver.stations().is_empty());
        assert!(driver.devices().is_empty());
        assert_eq!(driver.version(), None);
    }

    #[test]
    fn test_invalid_state() {
        let state = object(json!({"stations": {"serialNumber": "S1"}}));
        assert!(matches!(
            Driver::new(CommandEngine::new(), &state, 16),
            Err(EufyError::InvalidMessage { .. })
        ));

        let state = object(json!({"devices": [{"name": "no serial"}]}));
        assert!(matches!(
            Driver::new(CommandEngine::new(), &state, 16),
            Err(EufyError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn test_station_event_routed_and_emitted() {
        let driver = driver();
        let mut rx = driver.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _sub = driver.events().subscribe("property changed", move |data| {
            assert_eq!(data.get("value"), Some(&json!(63)));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        driver
            .receive_event(&event(json!({
                "source": "station",
                "event": "property changed",
                "serialNumber": "S1",
                "name": "currentMode",
                "value": 63,
            })))
            .unwrap();

        let station = driver.station("S1").unwrap();
        assert_eq!(station.alarm_mode(), Some(63));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let broadcast = rx.try_recv().unwrap();
        assert_eq!(broadcast.event_type, "property changed");
        assert_eq!(broadcast.serial_number(), Some("S1"));
    }

    #[test]
    fn test_unknown_serial_is_lookup_error() {
        let driver = driver();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _sub = driver.events().subscribe("property changed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = driver
            .receive_event(&event(json!({
                "source": "device",
                "event": "property changed",
                "serialNumber": "D9",
                "name": "enabled",
                "value": false,
            })))
            .unwrap_err();

        match err {
            EufyError::UnknownEntity {
                entity,
                serial_number,
            } => {
                assert_eq!(entity, EntitySource::Device);
                assert_eq!(serial_number, "D9");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_station_event_without_serial() {
        let driver = driver();
        let err = driver
            .receive_event(&event(json!({"source": "station", "event": "connected"})))
            .unwrap_err();
        assert!(matches!(err, EufyError::InvalidMessage { .. }));
    }

    #[test]
    fn test_driver_events_update_flags() {
        let driver = driver();
        driver
            .receive_event(&event(json!({"source": "driver", "event": "disconnected"})))
            .unwrap();
        driver
            .receive_event(&event(json!({"source": "driver", "event": "push connected"})))
            .unwrap();
        driver
            .receive_event(&event(json!({"source": "driver", "event": "verify code"})))
            .unwrap();

        assert_eq!(driver.connected(), Some(false));
        assert_eq!(driver.push_connected(), Some(true));
    }
}
