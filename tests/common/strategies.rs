use proptest::prelude::*;
use serde_json::{json, Value};

use usermanager::events::EventAction;

pub fn event_action_strategy() -> impl Strategy<Value = EventAction> {
    prop_oneof![
        Just(EventAction::Create),
        Just(EventAction::Update),
        Just(EventAction::Delete),
    ]
}

/// Snapshot-shaped payload with arbitrary field values
pub fn user_payload_strategy() -> impl Strategy<Value = Value> {
    ("[a-z]{1,12}", "[A-Z][a-z]{1,15}", 1950i32..2005).prop_map(|(local, name, year)| {
        json!({
            "email": format!("{local}@example.com"),
            "name": name,
            "birth_date": format!("{year}-01-01"),
        })
    })
}

/// Sequence of events to push through the pipeline
pub fn event_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<(EventAction, Value)>> {
    prop::collection::vec((event_action_strategy(), user_payload_strategy()), 1..max_len)
}
