use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::UserRepository;
use crate::error::AppResult;

/// Identity lookup consumed by the invitation reconciler: resolve an email
/// address to a unique account id, if one exists.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn lookup_user_by_email(&self, email: &str) -> AppResult<Option<String>>;
}

/// Identity provider backed by the service's own account table.
pub struct DirectoryIdentityProvider {
    pool: SqlitePool,
}

impl DirectoryIdentityProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for DirectoryIdentityProvider {
    async fn lookup_user_by_email(&self, email: &str) -> AppResult<Option<String>> {
        Ok(UserRepository::find_by_email(&self.pool, email)
            .await?
            .map(|user| user.id))
    }
}
