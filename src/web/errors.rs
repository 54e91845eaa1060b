//! # Web API Error Types
//!
//! HTTP mapping for everything a handler can fail with. Every error body has
//! the shape `{"error": {"code": "...", "message": "..."}}`; validation errors
//! also carry a `fields` map.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::users::UserError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Validation failed")]
    Validation { fields: BTreeMap<String, String> },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Validation { .. } => "VALIDATION_FAILED",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::Validation { fields } = &self {
            error["fields"] = json!(fields);
        }

        (status_code, Json(json!({ "error": error }))).into_response()
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound { .. } => ApiError::NotFound {
                message: err.to_string(),
            },
            UserError::Validation { fields } => ApiError::Validation { fields },
            UserError::EmailTaken { .. } => ApiError::Conflict {
                message: err.to_string(),
            },
            UserError::Repository { message } => {
                tracing::error!(error = %message, "User repository failure");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<uuid::Error> for ApiError {
    fn from(_: uuid::Error) -> Self {
        ApiError::bad_request("invalid user id")
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_user_error_status_mapping() {
        let cases = [
            (UserError::NotFound { id: Uuid::nil() }, StatusCode::NOT_FOUND),
            (UserError::validation([("email", "required")]), StatusCode::BAD_REQUEST),
            (
                UserError::EmailTaken {
                    email: "a@b.c".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (UserError::repository("disk"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
