//! # User Handlers
//!
//! CRUD endpoints over [`UserService`](crate::users::UserService).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::users::{UserPage, UserRequest, UserResponse};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Page number; defaults to 1 when absent
    pub fn page(&self) -> ApiResult<usize> {
        match self.page.as_deref().map(str::trim) {
            None | Some("") => Ok(1),
            Some(raw) => match raw.parse::<usize>() {
                Ok(page) if page >= 1 => Ok(page),
                _ => Err(ApiError::bad_request("invalid page")),
            },
        }
    }
}

fn parse_user_id(raw: &str) -> ApiResult<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}

/// GET /api/v1/users?page=N
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<UserPage>> {
    let page = query.page()?;
    let users = state.users.find_users(page).await?;
    debug!(page, count = users.len(), "Listing users");

    Ok(Json(UserPage {
        data: users.iter().map(UserResponse::from).collect(),
    }))
}

/// GET /api/v1/users/{user_id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let id = parse_user_id(&user_id)?;
    let user = state.users.find_user(id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Json(request) = body?;
    let new_user = request.validate()?;
    let user = state.users.create_user(new_user).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// PUT /api/v1/users/{user_id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let id = parse_user_id(&user_id)?;
    let Json(request) = body?;
    let new_user = request.validate()?;
    let user = state.users.update_user(id, new_user).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// DELETE /api/v1/users/{user_id}
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_user_id(&user_id)?;
    state.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query() {
        let page = |raw: Option<&str>| {
            PageQuery {
                page: raw.map(str::to_string),
            }
            .page()
        };

        assert_eq!(page(None).unwrap(), 1);
        assert_eq!(page(Some("")).unwrap(), 1);
        assert_eq!(page(Some("3")).unwrap(), 3);
        assert!(page(Some("0")).is_err());
        assert!(page(Some("-1")).is_err());
        assert!(page(Some("two")).is_err());
    }
}
