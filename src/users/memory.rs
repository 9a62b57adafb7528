use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{User, UserStore};
use crate::error::AppError;

/// In-process user store, keyed by user id
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user
    pub fn insert(&self, user: User) -> Result<(), AppError> {
        let mut users = self.lock()?;
        if users
            .values()
            .any(|existing| existing.username == user.username && existing.id != user.id)
        {
            return Err(AppError::internal(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        users.insert(user.id, user);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, User>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::internal("User store lock poisoned"))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()?
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<u64, AppError> {
        match self.lock()?.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
