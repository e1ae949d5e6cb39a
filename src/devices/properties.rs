// MIT License - Copyright (c) 2026 Peter Wright
// Open property bag shared by stations and devices

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use crate::event::Event;

/// Server-defined properties of an entity, keyed by property name.
///
/// The schema is owned by the server; typed getters return `None` for absent
/// keys and for values of an unexpected JSON type.
#[derive(Debug, Default)]
pub struct PropertyBag {
    inner: RwLock<Map<String, Value>>,
}

impl PropertyBag {
    pub fn new(state: Map<String, Value>) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.read().get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.inner.read().get(key).and_then(Value::as_i64)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().insert(key.into(), value);
    }

    /// Copy of the whole bag.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.read().clone()
    }

    /// Apply a `property changed` event: `bag[name] = value`.
    pub fn apply_property_changed(&self, event: &Event) {
        let Some(name) = event.name() else {
            debug!("Ignoring property change without a name: {:?}", event.data);
            return;
        };
        let value = event.value().cloned().unwrap_or(Value::Null);
        self.set(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> PropertyBag {
        match value {
            Value::Object(map) => PropertyBag::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_typed_getters_tolerate_foreign_types() {
        let props = bag(json!({"name": "Home", "enabled": true, "currentMode": 1}));
        assert_eq!(props.get_str("name").as_deref(), Some("Home"));
        assert_eq!(props.get_bool("enabled"), Some(true));
        assert_eq!(props.get_i64("currentMode"), Some(1));

        assert_eq!(props.get_str("currentMode"), None);
        assert_eq!(props.get_bool("name"), None);
        assert_eq!(props.get_i64("missing"), None);
    }

    #[test]
    fn test_apply_property_changed() {
        let props = bag(json!({"currentMode": 1}));
        let event = Event::from_envelope_data(match json!({
            "source": "station",
            "event": "property changed",
            "serialNumber": "S1",
            "name": "currentMode",
            "value": 63,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .unwrap();

        props.apply_property_changed(&event);
        assert_eq!(props.get_i64("currentMode"), Some(63));
    }

    #[test]
    fn test_property_change_without_name_is_ignored() {
        let props = bag(json!({"currentMode": 1}));
        let mut data = Map::new();
        data.insert("value".to_string(), json!(5));
        props.apply_property_changed(&Event::new("property changed", data));
        assert_eq!(props.snapshot().len(), 1);
    }
}
