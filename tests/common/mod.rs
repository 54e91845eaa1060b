#![allow(dead_code)]

pub mod strategies;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use usermanager::config::AppConfig;
use usermanager::messaging::{format_delivery, Delivery, DeliveryHandler, MessagingError};
use usermanager::users::NewUser;

/// Config bound to an ephemeral localhost port with a short shutdown grace
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.app.host = "127.0.0.1".to_string();
    config.app.port = 0;
    config.app.env = "test".to_string();
    config.events.shutdown_grace_seconds = 1;
    config
}

pub fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        name: "Ada".to_string(),
        lastname: "Lovelace".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
        phone: "+33788888888".to_string(),
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Run `future` to completion, failing the test if it takes longer than `timeout`
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("operation did not complete in time")
}

/// Handler that records every delivery and optionally fails
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    fail: bool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.deliveries.lock().iter().map(format_delivery).collect()
    }
}

#[async_trait]
impl DeliveryHandler for RecordingHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.deliveries.lock().push(delivery.clone());
        if self.fail {
            return Err(MessagingError::handler("downstream unavailable"));
        }
        Ok(())
    }
}
