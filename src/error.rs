use thiserror::Error;

use crate::config::ConfigurationError;
use crate::events::EventQueueError;
use crate::messaging::MessagingError;
use crate::orchestration::LifecycleError;
use crate::users::UserError;

/// Top-level error for startup and process-level failures
#[derive(Error, Debug)]
pub enum UserManagerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Event queue error: {0}")]
    EventQueue(#[from] EventQueueError),

    #[error("User error: {0}")]
    User(#[from] UserError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UserManagerError>;
