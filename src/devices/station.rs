// MIT License - Copyright (c) 2026 Peter Wright
// Base station entity

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::{AlarmMode, GuardMode};
use crate::devices::{serial_number_of, Entity, PropertyBag};
use crate::error::Result;
use crate::event::{Event, EventBus, EventHandler, EventKind, EventProtocol};
use crate::protocol::Command;
use crate::transport::command::CommandEngine;

/// A base station. Devices reference it through their `stationSerialNumber`.
pub struct Station {
    serial_number: String,
    properties: PropertyBag,
    events: EventBus,
    commands: CommandEngine,
}

const STATION_HANDLERS: &[(EventKind, EventHandler<Station>)] = &[
    (EventKind::Connected, Station::handle_connected),
    (EventKind::Disconnected, Station::handle_disconnected),
    (EventKind::GuardModeChanged, Station::handle_guard_mode_changed),
    (EventKind::PropertyChanged, Station::handle_property_changed),
];

impl Station {
    /// Build a station from its `start_listening` snapshot.
    pub fn new(commands: CommandEngine, state: Map<String, Value>) -> Result<Self> {
        let serial_number = serial_number_of(&state, "Station")?;
        Ok(Self {
            serial_number,
            properties: PropertyBag::new(state),
            events: EventBus::new(),
            commands,
        })
    }

    /// Whether the station is connected and online.
    pub fn connected(&self) -> Option<bool> {
        self.properties.get_bool("connected")
    }

    /// Raw `currentMode` code.
    pub fn alarm_mode(&self) -> Option<i64> {
        self.properties.get_i64("currentMode")
    }

    /// Raw `guardMode` code.
    pub fn guard_mode(&self) -> Option<i64> {
        self.properties.get_i64("guardMode")
    }

    pub fn alarm_mode_kind(&self) -> Option<AlarmMode> {
        self.alarm_mode().map(AlarmMode::from_code)
    }

    pub fn guard_mode_kind(&self) -> Option<GuardMode> {
        self.guard_mode().map(GuardMode::from_code)
    }

    pub fn lan_ip_address(&self) -> Option<String> {
        self.properties.get_str("lanIpAddress")
    }

    pub fn mac_address(&self) -> Option<String> {
        self.properties.get_str("macAddress")
    }

    /// Ask the server for the metadata of every station property.
    pub async fn get_properties_metadata(&self) -> Result<Value> {
        self.commands
            .send(&Command::StationGetPropertiesMetadata {
                serial_number: self.serial_number.clone(),
            })
            .await
    }

    /// Ask the server for the current value of every station property.
    pub async fn get_properties(&self) -> Result<Value> {
        self.commands
            .send(&Command::StationGetProperties {
                serial_number: self.serial_number.clone(),
            })
            .await
    }

    fn handle_connected(&self, _: &Event) {
        debug!("Station {} connected", self.serial_number);
    }

    fn handle_disconnected(&self, _: &Event) {
        debug!("Station {} disconnected", self.serial_number);
    }

    fn handle_guard_mode_changed(&self, _: &Event) {
        debug!("Station {} guard mode changed", self.serial_number);
    }

    fn handle_property_changed(&self, event: &Event) {
        self.properties.apply_property_changed(event);
    }
}

impl EventProtocol for Station {
    fn event_handlers() -> &'static [(EventKind, EventHandler<Self>)] {
        STATION_HANDLERS
    }
}

impl Entity for Station {
    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.serial_number == other.serial_number
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial_number.hash(state);
    }
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Station")
            .field("name", &self.name())
            .field("serial", &self.serial_number)
            .finish()
    }
}
