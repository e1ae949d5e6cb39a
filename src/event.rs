// MIT License - Copyright (c) 2026 Peter Wright
// Event values, the per-entity event bus and typed event dispatch

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EufyError, Result};

/// Opaque event payload as sent by the server.
pub type EventData = Map<String, Value>;

/// A single event pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event type tag, e.g. `"property changed"`.
    pub event_type: String,
    /// The full `event` object of the envelope, including routing fields.
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Build an event from the `event` object of an event envelope.
    ///
    /// The type tag is read from the object's own `event` field.
    pub fn from_envelope_data(data: EventData) -> Result<Self> {
        let event_type = data
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| EufyError::invalid_message("Event without an `event` type tag"))?
            .to_string();
        Ok(Self { event_type, data })
    }

    /// Parsed event kind, if this client knows the type tag.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_type(&self.event_type)
    }

    /// `"station"`, `"device"`, `"driver"`, or absent.
    pub fn source(&self) -> Option<&str> {
        self.data.get("source").and_then(Value::as_str)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.data.get("serialNumber").and_then(Value::as_str)
    }

    /// Property name carried by `property changed` events.
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    pub fn value(&self) -> Option<&Value> {
        self.data.get("value")
    }

    /// Server timestamp (epoch milliseconds) as UTC time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.data
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// Event types this client has handlers for.
///
/// Anything else stays an opaque [`Event`]; it is still re-emitted by the
/// driver, but no entity handler runs for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PropertyChanged,
    Connected,
    Disconnected,
    GuardModeChanged,
    PushConnected,
    PushDisconnected,
}

const EVENT_KINDS: [(&str, EventKind); 6] = [
    ("property_changed", EventKind::PropertyChanged),
    ("connected", EventKind::Connected),
    ("disconnected", EventKind::Disconnected),
    ("guard_mode_changed", EventKind::GuardModeChanged),
    ("push_connected", EventKind::PushConnected),
    ("push_disconnected", EventKind::PushDisconnected),
];

impl EventKind {
    /// Parse a wire type tag. Spaces are normalized to `_` first, so
    /// `"guard mode changed"` and `"guard_mode_changed"` are the same kind.
    pub fn from_type(event_type: &str) -> Option<Self> {
        let normalized = event_type.trim().replace(' ', "_");
        EVENT_KINDS
            .iter()
            .find(|(tag, _)| *tag == normalized)
            .map(|(_, kind)| *kind)
    }

    /// The wire string representation (e.g., "property changed").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropertyChanged => "property changed",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::GuardModeChanged => "guard mode changed",
            Self::PushConnected => "push connected",
            Self::PushDisconnected => "push disconnected",
        }
    }
}

/// Handler signature used in dispatch tables.
pub type EventHandler<T> = fn(&T, &Event);

/// Typed event dispatch: each entity declares a static table mapping an
/// [`EventKind`] to one of its handler methods.
pub trait EventProtocol: Sized + 'static {
    fn event_handlers() -> &'static [(EventKind, EventHandler<Self>)];

    /// Run the handler registered for this event's kind. Unknown types and
    /// kinds without a handler are logged and ignored.
    fn handle_event_protocol(&self, event: &Event) {
        let handler = event.kind().and_then(|kind| {
            Self::event_handlers()
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, handler)| *handler)
        });

        match handler {
            Some(handler) => handler(self, event),
            None => debug!("Received unknown event: {} {:?}", event.event_type, event.data),
        }
    }
}

/// Callback registered on an [`EventBus`].
pub type Callback = Arc<dyn Fn(&EventData) + Send + Sync>;

struct Listener {
    id: u64,
    callback: Callback,
}

type ListenerMap = HashMap<String, Vec<Listener>>;

/// Named-event publish/subscribe, one per entity.
///
/// Emission is synchronous and runs over a snapshot of the listener list, so a
/// callback may subscribe or unsubscribe (itself or others) while it runs.
#[derive(Default)]
pub struct EventBus {
    listeners: Arc<Mutex<ListenerMap>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `event_name`. Callbacks fire in subscription order.
    pub fn subscribe<F>(&self, event_name: &str, callback: F) -> Subscription
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.insert(event_name, id, Arc::new(callback))
    }

    /// Register a callback that runs at most once.
    ///
    /// The listener removes itself before the callback is invoked.
    pub fn subscribe_once<F>(&self, event_name: &str, callback: F) -> Subscription
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listeners = Arc::downgrade(&self.listeners);
        let name = event_name.to_string();
        let fired = AtomicBool::new(false);

        let wrapper = move |data: &EventData| {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            remove_listener(&listeners, &name, id);
            callback(data);
        };

        self.insert(event_name, id, Arc::new(wrapper))
    }

    /// Invoke every callback currently registered for `event_name`.
    pub fn emit(&self, event_name: &str, data: &EventData) {
        let snapshot: Vec<Callback> = self
            .listeners
            .lock()
            .get(event_name)
            .map(|list| list.iter().map(|l| Arc::clone(&l.callback)).collect())
            .unwrap_or_default();

        for callback in snapshot {
            callback(data);
        }
    }

    /// Number of callbacks registered for `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners
            .lock()
            .get(event_name)
            .map_or(0, Vec::len)
    }

    fn insert(&self, event_name: &str, id: u64, callback: Callback) -> Subscription {
        self.listeners
            .lock()
            .entry(event_name.to_string())
            .or_default()
            .push(Listener { id, callback });

        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            event_name: event_name.to_string(),
            id,
        }
    }
}

fn remove_listener(listeners: &Weak<Mutex<ListenerMap>>, event_name: &str, id: u64) {
    let Some(listeners) = listeners.upgrade() else {
        return;
    };
    let mut map = listeners.lock();
    if let Some(list) = map.get_mut(event_name) {
        list.retain(|l| l.id != id);
        if list.is_empty() {
            map.remove(event_name);
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]; removes exactly that callback.
///
/// Dropping the handle leaves the callback registered.
#[derive(Debug, Clone)]
pub struct Subscription {
    listeners: Weak<Mutex<ListenerMap>>,
    event_name: String,
    id: u64,
}

impl Subscription {
    /// Remove the callback. Calling this again is a no-op.
    pub fn unsubscribe(&self) {
        remove_listener(&self.listeners, &self.event_name, self.id);
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<Event>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<Event>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
