//! # Lifecycle Orchestration
//!
//! Runs the HTTP server and the event workers as one unit under a single
//! cancellation token.
//!
//! - [`lifecycle`]: task supervision, first-error policy and shutdown grace
//! - [`signals`]: SIGINT, SIGTERM and SIGUSR1 handling
//! - [`bootstrap`]: wires config, broker, workers and router into a runnable app

pub mod bootstrap;
pub mod lifecycle;
pub mod signals;

use thiserror::Error;

pub use bootstrap::{bootstrap, bootstrap_with_broker, AppHandle};
pub use lifecycle::Lifecycle;
pub use signals::{wait_for_shutdown_signal, ShutdownSignal};

/// Failures surfaced by [`Lifecycle::run`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Task {task} panicked")]
    TaskPanicked { task: String },

    #[error("Task {task} did not stop within {grace_ms}ms of shutdown")]
    ShutdownTimeout { task: String, grace_ms: u64 },

    #[error("Failed to bind {address}: {message}")]
    Bind { address: String, message: String },
}

impl LifecycleError {
    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn bind(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bind {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Name of the task the error belongs to, if any
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { task, .. }
            | Self::TaskPanicked { task }
            | Self::ShutdownTimeout { task, .. } => Some(task),
            Self::Bind { .. } => None,
        }
    }
}
