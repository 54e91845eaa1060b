//! Shared state handed to every handler

use crate::users::UserService;

#[derive(Debug, Clone)]
pub struct AppState {
    pub users: UserService,
    pub app_name: String,
    pub environment: String,
}

impl AppState {
    pub fn new(users: UserService, app_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            users,
            app_name: app_name.into(),
            environment: environment.into(),
        }
    }
}
