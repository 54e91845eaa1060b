#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # User Manager
//!
//! Event-propagation core of a user-management backend.
//!
//! ## Overview
//!
//! Every successful user mutation produces one event. Events flow through a
//! bounded in-process queue to a single publisher worker that delivers them to
//! a durable RabbitMQ exchange. A consumer worker subscribed to the bound queue
//! logs each delivery. The HTTP server and both workers share one lifecycle:
//! they start together and stop together on a signal or on the first failure.
//!
//! ```text
//! HTTP handlers ──► UserService ──► EventQueue (128) ──► PublisherWorker ──► exchange
//!                                                                              │
//!                                    ConsumerWorker ◄── queue ◄── POST/PUT/DELETE bindings
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration (file, environment, `.env`)
//! - [`error`] - Top-level error type
//! - [`events`] - Event model and bounded event queue
//! - [`messaging`] - Topology, publisher and consumer workers, broker providers
//! - [`orchestration`] - Lifecycle supervision, signals and bootstrap
//! - [`users`] - User use cases and repository
//! - [`web`] - Axum REST API
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use usermanager::config::ConfigManager;
//! use usermanager::orchestration::bootstrap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?.into_config();
//! let app = bootstrap(&config).await?;
//! app.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod users;
pub mod web;

pub use config::{AppConfig, ConfigManager};
pub use error::{Result, UserManagerError};
pub use events::{event_queue, Event, EventAction, EventReceiver, EventSender};
pub use messaging::{ConsumerWorker, MessagingError, PublisherWorker, Topology};
pub use orchestration::{AppHandle, Lifecycle, LifecycleError};
