//! Read-only access to provisioned user records

use async_trait::async_trait;

use crate::database::DatabaseManager;
use crate::error::StoreError;
use crate::models::User;

/// Lookup of user records by username.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl CredentialStore for DatabaseManager {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        DatabaseManager::find_user(self, username).await
    }
}
