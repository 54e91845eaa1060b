//! # Domain-Change Events
//!
//! Immutable records of user create/update/delete operations and the JSON
//! envelope they travel in once handed to the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of change an event describes.
///
/// Each action maps to exactly one routing key; the set of routing keys is what
/// the broker queue is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl EventAction {
    pub const ALL: [EventAction; 3] = [EventAction::Create, EventAction::Update, EventAction::Delete];

    /// Routing key (and message type token) used on the broker
    pub fn routing_key(self) -> &'static str {
        match self {
            EventAction::Create => "POST",
            EventAction::Update => "PUT",
            EventAction::Delete => "DELETE",
        }
    }

    /// Human-readable label consumers log or dispatch on
    pub fn label(self) -> &'static str {
        match self {
            EventAction::Create => "UserCreated",
            EventAction::Update => "UserUpdated",
            EventAction::Delete => "UserDeleted",
        }
    }

    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.routing_key() == routing_key)
    }
}

/// Label for a delivery's routing key; unknown keys map to an empty label.
pub fn action_label(routing_key: &str) -> &'static str {
    EventAction::from_routing_key(routing_key)
        .map(EventAction::label)
        .unwrap_or("")
}

/// A domain-change event.
///
/// Fields are private: once created an event cannot be altered, only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Uuid,
    timestamp: DateTime<Utc>,
    action: EventAction,
    subject_id: String,
    payload: Value,
}

impl Event {
    /// Create an event with a fresh id and the current UTC time
    pub fn new(action: EventAction, subject_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            subject_id: subject_id.into(),
            payload,
        }
    }

    /// Create an event whose payload is a serialized snapshot of `record`
    pub fn from_snapshot<T: Serialize>(
        action: EventAction,
        subject_id: impl Into<String>,
        record: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(action, subject_id, serde_json::to_value(record)?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn action(&self) -> EventAction {
        self.action
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn routing_key(&self) -> &'static str {
        self.action.routing_key()
    }

    /// Serialize to the JSON transport body
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&EventEnvelope::from(self))
    }
}

/// JSON body published to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub time_stamp: DateTime<Utc>,
    pub event_action: String,
    pub user_id: String,
    pub user_payload: Value,
}

impl From<&Event> for EventEnvelope {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            time_stamp: event.timestamp,
            event_action: event.routing_key().to_string(),
            user_id: event.subject_id.clone(),
            user_payload: event.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_keys_are_distinct_and_reversible() {
        for action in EventAction::ALL {
            assert_eq!(EventAction::from_routing_key(action.routing_key()), Some(action));
        }
        assert_eq!(EventAction::from_routing_key("PATCH"), None);
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(action_label("POST"), "UserCreated");
        assert_eq!(action_label("PUT"), "UserUpdated");
        assert_eq!(action_label("DELETE"), "UserDeleted");
        assert_eq!(action_label("PATCH"), "");
        assert_eq!(action_label(""), "");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::new(EventAction::Create, "u-1", json!({}));
        let b = Event::new(EventAction::Create, "u-1", json!({}));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_envelope_field_names() {
        let event = Event::new(
            EventAction::Delete,
            "5b0c6a3e-1111-4c1e-9d55-000000000001",
            json!({"email": "ada@example.com"}),
        );

        let body: Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(body["event_id"], event.id().to_string());
        assert_eq!(body["event_action"], "DELETE");
        assert_eq!(body["user_id"], "5b0c6a3e-1111-4c1e-9d55-000000000001");
        assert_eq!(body["user_payload"]["email"], "ada@example.com");

        let time_stamp = body["time_stamp"].as_str().unwrap();
        let parsed = DateTime::parse_from_rfc3339(time_stamp).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), event.timestamp());
    }
}
