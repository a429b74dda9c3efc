use crate::errors::{ProviderError, RepoError, StorageError};
use crate::models::{PaymentRecord, QaRecord, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Row-oriented user data kept by the identity/persistence service.
#[async_trait]
pub trait ProblemRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a new user profile.
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), RepoError>;

    /// Returns Ok(None) if the profile does not exist.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError>;

    async fn save_qa(&self, record: &QaRecord) -> Result<(), RepoError>;

    /// Most recent records first, at most `limit` of them.
    async fn list_recent_qa(&self, user_id: &str, limit: usize) -> Result<Vec<QaRecord>, RepoError>;

    /// Writes the streak fields. Fails with `NotFound` for unknown users.
    async fn update_login(&self, user_id: &str, at: DateTime<Utc>, streak: u32) -> Result<(), RepoError>;

    /// Marks the subscription active for the given window.
    async fn activate_subscription(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    async fn save_payment(&self, payment: &PaymentRecord) -> Result<(), RepoError>;
}

/// Trait defining operations for storing file data (rendered memes).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;
}

/// Single-shot text generation.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError>;
}
