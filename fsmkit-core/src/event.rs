//! Events delivered to subjects.

use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Untyped key/value bundle carried by an event into its hooks.
pub type Payload = Map<String, Value>;

/// Name of the synthetic event used to run the initial state's entry hook.
pub const START_EVENT: &str = "start";

/// Where an event came from. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EventSource {
    /// A front-end control or other caller outside the runtime.
    External(String),
    /// Another subject, by key.
    Subject(String),
    /// The receiving subject itself.
    #[default]
    Itself,
}

/// An immutable named occurrence delivered to a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    name: String,

    #[serde(default)]
    source: EventSource,

    /// Key of the subject this event is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    payload: Payload,

    /// Whether the source asked to be told the resulting state.
    #[serde(default)]
    notify: bool,
}

impl Event {
    /// Creates an event with no target, no payload and source [`EventSource::Itself`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EventSource::Itself,
            target: None,
            payload: Payload::new(),
            notify: false,
        }
    }

    /// The synthetic `start` event used when a subject is initialised.
    pub fn start() -> Self {
        Self::new(START_EVENT)
    }

    pub fn from_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    /// Addresses the event to the subject with the given key.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Adds a single payload entry.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Requests a completion notification once a queued worker processes this event.
    pub fn notify_on_completion(mut self) -> Self {
        self.notify = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns a payload value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn wants_notification(&self) -> bool {
        self.notify
    }

    /// Checks the event against the subject it was delivered to.
    pub fn validate(&self, table: &Table, subject_key: &str) -> Result<(), Rejection> {
        if let Some(target) = &self.target {
            if target != subject_key {
                return Err(Rejection::TargetMismatch {
                    expected: subject_key.to_string(),
                    actual: target.clone(),
                });
            }
        }

        if !table.accepts_event(&self.name) {
            return Err(Rejection::UnknownEvent {
                event: self.name.clone(),
            });
        }

        Ok(())
    }
}

/// Why an event was refused before reaching the transition lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Rejection {
    /// The event name does not appear in any transition of the table.
    UnknownEvent { event: String },
    /// The event is addressed to a different subject.
    TargetMismatch { expected: String, actual: String },
    /// The subject's table has no initial state, so it has no current state.
    NoInitialState,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownEvent { event } => {
                write!(f, "table does not accept event '{}'", event)
            }
            Rejection::TargetMismatch { expected, actual } => {
                write!(f, "event addressed to '{}', delivered to '{}'", actual, expected)
            }
            Rejection::NoInitialState => f.write_str("subject has no current state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> Table {
        let mut table = Table::new("LAMP");
        let off = table.add_state("Off").unwrap();
        let on = table.add_state("On").unwrap();
        table.add_transition(off, "toggle", on).unwrap();
        table.add_transition(on, "toggle", off).unwrap();
        table
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new("toggle")
            .from_source(EventSource::External("button-1".to_string()))
            .to("LAMP:desk")
            .with_value("brightness", 80)
            .notify_on_completion();

        assert_eq!(event.name(), "toggle");
        assert_eq!(event.target(), Some("LAMP:desk"));
        assert_eq!(event.get("brightness"), Some(&json!(80)));
        assert!(event.wants_notification());
        assert_eq!(
            event.source(),
            &EventSource::External("button-1".to_string())
        );
    }

    #[test]
    fn test_validate_accepts_known_event() {
        let table = table();
        assert!(Event::new("toggle").validate(&table, "LAMP:desk").is_ok());
        assert!(Event::new("toggle")
            .to("LAMP:desk")
            .validate(&table, "LAMP:desk")
            .is_ok());
    }

    #[test]
    fn test_validate_unknown_event() {
        let table = table();
        let result = Event::new("explode").validate(&table, "LAMP:desk");
        assert_eq!(
            result,
            Err(Rejection::UnknownEvent {
                event: "explode".to_string()
            })
        );
    }

    #[test]
    fn test_validate_target_mismatch() {
        let table = table();
        let result = Event::new("toggle")
            .to("LAMP:kitchen")
            .validate(&table, "LAMP:desk");
        assert!(matches!(result, Err(Rejection::TargetMismatch { .. })));
    }
}
