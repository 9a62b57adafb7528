use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{RefreshTokenRecord, TokenStore};
use crate::error::AppError;

/// In-process refresh token store.
///
/// Every operation runs under one mutex acquisition, which gives `mark_used`
/// the same test-and-set semantics as the conditional SQL update.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records currently stored for a family
    pub fn family_records(&self, family: &str) -> Result<Vec<RefreshTokenRecord>, AppError> {
        Ok(self
            .lock()?
            .values()
            .filter(|record| record.family == family)
            .cloned()
            .collect())
    }

    /// Number of unused records in a family
    pub fn live_count(&self, family: &str) -> Result<usize, AppError> {
        Ok(self
            .lock()?
            .values()
            .filter(|record| record.family == family && !record.used)
            .count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, RefreshTokenRecord>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::internal("Token store lock poisoned"))
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_by_token_id(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.lock()?.get(jti).cloned())
    }

    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        let mut records = self.lock()?;
        if records.contains_key(&record.jti) {
            return Err(AppError::internal(format!(
                "Duplicate key on insert: jti '{}'",
                record.jti
            )));
        }
        records.insert(record.jti.clone(), record.clone());
        Ok(())
    }

    async fn mark_used(&self, jti: &str) -> Result<u64, AppError> {
        match self.lock()?.get_mut(jti) {
            Some(record) if !record.used => {
                record.used = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_by_token_id(&self, jti: &str) -> Result<u64, AppError> {
        Ok(self.lock()?.remove(jti).map_or(0, |_| 1))
    }

    async fn delete_family(&self, family: &str) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, record| record.family != family);
        Ok((before - records.len()) as u64)
    }

    async fn delete_for_user_except_family(
        &self,
        user_id: Uuid,
        family: &str,
    ) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, record| record.user_id != user_id || record.family == family);
        Ok((before - records.len()) as u64)
    }
}
