//! # Users
//!
//! Producer side of the event pipeline: user use cases that emit one event
//! per successful mutation.

pub mod model;
pub mod repository;
pub mod service;

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

pub use model::{NewUser, User, UserPage, UserRequest, UserResponse};
pub use repository::{InMemoryUserRepository, UserRepository, PAGE_SIZE};
pub use service::UserService;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("User {id} not found")]
    NotFound { id: Uuid },

    #[error("Invalid user data: {}", describe_fields(.fields))]
    Validation { fields: BTreeMap<String, String> },

    #[error("Email {email} is already registered")]
    EmailTaken { email: String },

    #[error("User repository error: {message}")]
    Repository { message: String },
}

impl UserError {
    pub fn validation<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Validation {
            fields: fields
                .into_iter()
                .map(|(field, message)| (field.into(), message.into()))
                .collect(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
        }
    }
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
