use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recruit_shared::ExecutionRecord;
use sqlx::PgPool;
use uuid::Uuid;

use crate::workflows::AuditRepository;
use crate::workflows::collaborators::RepoResult;

/// Workflow execution audit trail backed by Postgres
#[derive(Debug, Clone)]
pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn insert_execution_record(&self, record: &ExecutionRecord) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_execution_records (
                id, workflow_id, application_id, action_type, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.workflow_id)
        .bind(record.application_id)
        .bind(&record.action_type)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists_execution_record(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        since: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM workflow_execution_records
                WHERE workflow_id = $1 AND application_id = $2 AND created_at >= $3
            )
            "#,
        )
        .bind(workflow_id)
        .bind(application_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn claim_execution_window(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflow_execution_windows (workflow_id, application_id, window_start)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id, application_id, window_start) DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(application_id)
        .bind(window_start)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
