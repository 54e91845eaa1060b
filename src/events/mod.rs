pub mod queue;
pub mod types;

// Re-export key types for convenience
pub use queue::{event_queue, EventQueueError, EventReceiver, EventSender, DEFAULT_QUEUE_CAPACITY};
pub use types::{action_label, Event, EventAction, EventEnvelope};
