//! Events exchanged with the peer process.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Target identifier addressing the process as a whole rather than one entity.
pub const PROCESS_TARGET_ID: &str = "";

/// A named, targeted message carried over the line protocol.
///
/// On the wire an event is a single JSON object: `name` is required,
/// `targetID` is optional (absent means [`PROCESS_TARGET_ID`]), and every
/// other field belongs to the open-ended payload.
///
/// ```text
/// {"name":"window.event.resized","targetID":"3","width":800,"height":600}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name; dispatch identity together with the target id.
    pub name: String,
    /// Entity the event addresses.
    #[serde(rename = "targetID", default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,
    /// Remaining fields, flattened into the same JSON object.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(name: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_id: target_id.into(),
            payload: Map::new(),
        }
    }

    /// Creates an event addressed to the process-wide target.
    #[must_use]
    pub fn process_wide(name: impl Into<String>) -> Self {
        Self::new(name, PROCESS_TARGET_ID)
    }

    /// Adds a payload field, replacing any previous value under `key`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Returns the payload field stored under `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Decodes the whole payload into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the payload does not
    /// match `T`.
    pub fn payload_as<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }

    /// True when the event addresses the process-wide target.
    #[must_use]
    pub fn is_process_wide(&self) -> bool {
        self.target_id == PROCESS_TARGET_ID
    }

    /// True when the event has no name, whatever its target or payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}
