use async_trait::async_trait;
use recruit_shared::UserContact;
use sqlx::PgPool;
use uuid::Uuid;

use crate::workflows::UserDirectory;
use crate::workflows::collaborators::RepoResult;

#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user_email(&self, user_id: Uuid) -> RepoResult<Option<UserContact>> {
        let user = sqlx::query_as("SELECT id, email, first_name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_users(&self, user_ids: &[Uuid]) -> RepoResult<Vec<UserContact>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as("SELECT id, email, first_name FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }
}
