/// User store contract
///
/// Users are owned by the user-management side of the application; the
/// authentication core only reads them and updates password hashes.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Returns the number of rows updated (0 when the user no longer exists)
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<u64, AppError>;
}
