//! User persistence

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::model::{NewUser, User};
use super::UserError;

/// Users returned per page
pub const PAGE_SIZE: usize = 20;

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn fetch_by_id(&self, id: Uuid) -> Result<User, UserError>;

    /// One page of users ordered by creation time; pages start at 1
    async fn fetch_page(&self, page: usize) -> Result<Vec<User>, UserError>;

    async fn create(&self, user: NewUser) -> Result<User, UserError>;

    async fn update(&self, id: Uuid, user: NewUser) -> Result<User, UserError>;

    /// Remove the user and return its last state
    async fn delete(&self, id: Uuid) -> Result<User, UserError>;
}

/// Process-local repository with a unique email index
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<DashMap<Uuid, User>>,
    emails: Arc<DashMap<String, Uuid>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Reserve `email` for `id`; fails if another user holds it
    fn claim_email(&self, email: &str, id: Uuid) -> Result<(), UserError> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(owner) if *owner.get() != id => Err(UserError::EmailTaken {
                email: email.to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn fetch_by_id(&self, id: Uuid) -> Result<User, UserError> {
        self.users
            .get(&id)
            .map(|user| user.clone())
            .ok_or(UserError::NotFound { id })
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<User>, UserError> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let offset = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
        Ok(users.into_iter().skip(offset).take(PAGE_SIZE).collect())
    }

    async fn create(&self, user: NewUser) -> Result<User, UserError> {
        let id = Uuid::new_v4();
        self.claim_email(&user.email, id)?;

        let now = Utc::now();
        let created = User {
            id,
            email: user.email,
            name: user.name,
            lastname: user.lastname,
            birth_date: user.birth_date,
            phone: user.phone,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, user: NewUser) -> Result<User, UserError> {
        let previous_email = self
            .users
            .get(&id)
            .map(|existing| existing.email.clone())
            .ok_or(UserError::NotFound { id })?;

        if previous_email != user.email {
            self.claim_email(&user.email, id)?;
        }

        let updated = {
            let Some(mut existing) = self.users.get_mut(&id) else {
                // Deleted concurrently; release the email we just claimed
                self.emails.remove_if(&user.email, |_, owner| *owner == id);
                return Err(UserError::NotFound { id });
            };
            existing.email = user.email;
            existing.name = user.name;
            existing.lastname = user.lastname;
            existing.birth_date = user.birth_date;
            existing.phone = user.phone;
            existing.updated_at = Utc::now();
            existing.clone()
        };

        if previous_email != updated.email {
            self.emails.remove_if(&previous_email, |_, owner| *owner == id);
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<User, UserError> {
        let (_, removed) = self.users.remove(&id).ok_or(UserError::NotFound { id })?;
        self.emails.remove_if(&removed.email, |_, owner| *owner == id);
        Ok(removed)
    }
}
