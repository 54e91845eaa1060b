//! User use cases
//!
//! Every successful create, update or delete hands exactly one event to the
//! event queue after the repository call returns. Enqueueing waits while the
//! queue is full. Failures to enqueue are logged and never reach the caller.

use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use super::model::{NewUser, User, UserResponse};
use super::repository::UserRepository;
use super::UserError;
use crate::events::{Event, EventAction, EventSender};

#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    events: EventSender,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>, events: EventSender) -> Self {
        Self { repository, events }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<User, UserError> {
        self.repository.fetch_by_id(id).await
    }

    pub async fn find_users(&self, page: usize) -> Result<Vec<User>, UserError> {
        self.repository.fetch_page(page).await
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User, UserError> {
        let created = self.repository.create(user).await?;
        info!(user_id = %created.id, "User created");
        self.emit(EventAction::Create, &created).await;
        Ok(created)
    }

    pub async fn update_user(&self, id: Uuid, user: NewUser) -> Result<User, UserError> {
        let updated = self.repository.update(id, user).await?;
        info!(user_id = %updated.id, "User updated");
        self.emit(EventAction::Update, &updated).await;
        Ok(updated)
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), UserError> {
        let deleted = self.repository.delete(id).await?;
        info!(user_id = %deleted.id, "User deleted");
        self.emit(EventAction::Delete, &deleted).await;
        Ok(())
    }

    async fn emit(&self, action: EventAction, user: &User) {
        let event = match Event::from_snapshot(action, user.id.to_string(), &UserResponse::from(user)) {
            Ok(event) => event,
            Err(e) => {
                error!(user_id = %user.id, action = action.label(), error = %e, "Failed to build user event");
                return;
            }
        };

        let event_id = event.id();
        match self.events.enqueue(event).await {
            Ok(()) => debug!(%event_id, user_id = %user.id, action = action.label(), "User event enqueued"),
            Err(e) => error!(user_id = %user.id, action = action.label(), error = %e, "User event not propagated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_queue;
    use crate::users::InMemoryUserRepository;
    use chrono::NaiveDate;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
            phone: "+33788888888".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mutations_emit_one_event_each() {
        let (tx, mut rx) = event_queue(8);
        let service = UserService::new(Arc::new(InMemoryUserRepository::new()), tx);

        let user = service.create_user(new_user("ada@example.com")).await.unwrap();
        service
            .update_user(user.id, new_user("countess@example.com"))
            .await
            .unwrap();
        service.delete_user(user.id).await.unwrap();

        let mut actions = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(10), rx.dequeue()).await
        {
            assert_eq!(event.subject_id(), user.id.to_string());
            actions.push(event.action());
        }
        assert_eq!(
            actions,
            vec![EventAction::Create, EventAction::Update, EventAction::Delete]
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_emits_nothing() {
        let (tx, rx) = event_queue(8);
        let service = UserService::new(Arc::new(InMemoryUserRepository::new()), tx);

        assert!(service.delete_user(Uuid::new_v4()).await.is_err());
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_does_not_fail_the_call() {
        let (tx, rx) = event_queue(8);
        rx.close();
        let service = UserService::new(Arc::new(InMemoryUserRepository::new()), tx);

        let user = service.create_user(new_user("ada@example.com")).await.unwrap();
        assert_eq!(service.find_user(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_event_payload_is_user_snapshot() {
        let (tx, mut rx) = event_queue(8);
        let service = UserService::new(Arc::new(InMemoryUserRepository::new()), tx);

        let user = service.create_user(new_user("ada@example.com")).await.unwrap();
        let event = rx.dequeue().await.unwrap();
        let snapshot: UserResponse = serde_json::from_value(event.payload().clone()).unwrap();
        assert_eq!(snapshot, UserResponse::from(&user));
    }
}
