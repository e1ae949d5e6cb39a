// MIT License - Copyright (c) 2026 Peter Wright
// Stations, devices and the behaviour they share

pub mod device;
pub mod properties;
pub mod station;

pub use device::Device;
pub use properties::PropertyBag;
pub use station::Station;

use serde_json::{Map, Value};

use crate::error::{EufyError, Result};
use crate::event::{Event, EventBus, EventProtocol};

/// Common surface of stations and devices: an immutable serial number, an
/// open property bag and an event bus.
pub trait Entity: EventProtocol {
    fn serial_number(&self) -> &str;

    fn properties(&self) -> &PropertyBag;

    fn events(&self) -> &EventBus;

    /// Apply an event routed to this entity, then emit it on the entity's bus.
    fn receive_event(&self, event: &Event) {
        self.handle_event_protocol(event);
        self.events().emit(&event.event_type, &event.data);
    }

    fn name(&self) -> Option<String> {
        self.properties().get_str("name")
    }

    fn model(&self) -> Option<String> {
        self.properties().get_str("model")
    }

    fn hardware_version(&self) -> Option<String> {
        self.properties().get_str("hardwareVersion")
    }

    fn software_version(&self) -> Option<String> {
        self.properties().get_str("softwareVersion")
    }

    /// The server's `type` property (a model family code or name).
    fn device_type(&self) -> Option<Value> {
        self.properties().get("type")
    }
}

/// Pull the identity key out of an entity snapshot.
pub(crate) fn serial_number_of(state: &Map<String, Value>, kind: &str) -> Result<String> {
    state
        .get("serialNumber")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EufyError::InvalidMessage {
            details: format!("{kind} without a serialNumber"),
        })
}
