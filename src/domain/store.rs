use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewUser, User, UserFilter, UserPatch};
use crate::error::AppError;

/// Account storage.
///
/// Lookups by id or username only see rows that are active and not deleted;
/// a miss is `AppError::ResourceNotFound`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_all(&self, filter: &UserFilter) -> Result<Vec<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<User, AppError>;

    async fn create(&self, user: &NewUser) -> Result<User, AppError>;

    async fn update(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

/// Persisted set of token strings that must never be trusted again.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Records `token` as revoked. Revoking the same token twice succeeds.
    ///
    /// `expires_at` is the token's own expiry; `None` keeps the entry forever.
    async fn add_revoked_token(
        &self,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError>;

    /// Drops entries whose token has expired on its own, returning how many
    /// were removed. Entries without an expiry are never dropped.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}
