// MIT License - Copyright (c) 2026 Peter Wright
// Device entity (cameras, sensors, locks, ...)

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::devices::{serial_number_of, Entity, PropertyBag};
use crate::error::Result;
use crate::event::{Event, EventBus, EventHandler, EventKind, EventProtocol};
use crate::protocol::Command;
use crate::transport::command::CommandEngine;

/// A device attached to a station.
pub struct Device {
    serial_number: String,
    properties: PropertyBag,
    events: EventBus,
    commands: CommandEngine,
}

const DEVICE_HANDLERS: &[(EventKind, EventHandler<Device>)] =
    &[(EventKind::PropertyChanged, Device::handle_property_changed)];

impl Device {
    /// Build a device from its `start_listening` snapshot.
    pub fn new(commands: CommandEngine, state: Map<String, Value>) -> Result<Self> {
        let serial_number = serial_number_of(&state, "Device")?;
        Ok(Self {
            serial_number,
            properties: PropertyBag::new(state),
            events: EventBus::new(),
            commands,
        })
    }

    pub fn enabled(&self) -> Option<bool> {
        self.properties.get_bool("enabled")
    }

    /// Serial number of the owning station. Not checked against the driver.
    pub fn station_serial_number(&self) -> Option<String> {
        self.properties.get_str("stationSerialNumber")
    }

    /// Ask the server for the metadata of every device property.
    pub async fn get_properties_metadata(&self) -> Result<Value> {
        self.commands
            .send(&Command::DeviceGetPropertiesMetadata {
                serial_number: self.serial_number.clone(),
            })
            .await
    }

    /// Ask the server for the current value of every device property.
    pub async fn get_properties(&self) -> Result<Value> {
        self.commands
            .send(&Command::DeviceGetProperties {
                serial_number: self.serial_number.clone(),
            })
            .await
    }

    fn handle_property_changed(&self, event: &Event) {
        self.properties.apply_property_changed(event);
    }
}

impl EventProtocol for Device {
    fn event_handlers() -> &'static [(EventKind, EventHandler<Self>)] {
        DEVICE_HANDLERS
    }
}

impl Entity for Device {
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

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.serial_number == other.serial_number
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial_number.hash(state);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .field("serial", &self.serial_number)
            .finish()
    }
}
