use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::workflows::collaborators::RepoResult;
use crate::workflows::{Conditions, TriggerType, WorkflowDefinition, WorkflowRepository};

const WORKFLOW_COLUMNS: &str = "id, name, description, stage_id, trigger, conditions, actions, \
                                delay_minutes, is_active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    stage_id: Uuid,
    trigger: String,
    conditions: Option<serde_json::Value>,
    actions: serde_json::Value,
    delay_minutes: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkflowRow> for WorkflowDefinition {
    type Error = RepositoryError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let trigger = TriggerType::parse(&row.trigger).ok_or_else(|| {
            RepositoryError::InvalidData(format!(
                "workflow {} has unknown trigger '{}'",
                row.id, row.trigger
            ))
        })?;

        let conditions: Conditions = match row.conditions {
            Some(serde_json::Value::Null) | None => Conditions::new(),
            Some(value) => serde_json::from_value(value)?,
        };

        Ok(WorkflowDefinition {
            id: row.id,
            name: row.name,
            description: row.description,
            stage_id: row.stage_id,
            trigger,
            conditions,
            actions: serde_json::from_value(row.actions)?,
            delay_minutes: i64::from(row.delay_minutes),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Decodes rows, dropping (and logging) any that no longer parse so one bad
/// definition cannot hide the others from the engine.
fn decode_all(rows: Vec<WorkflowRow>) -> Vec<WorkflowDefinition> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            WorkflowDefinition::try_from(row)
                .map_err(|e| tracing::error!("Skipping unreadable workflow {}: {}", id, e))
                .ok()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn delay_column(workflow: &WorkflowDefinition) -> RepoResult<i32> {
        i32::try_from(workflow.delay_minutes).map_err(|_| {
            RepositoryError::InvalidData(format!("delayMinutes {} out of range", workflow.delay_minutes))
        })
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn find_active_by_stage_and_trigger(
        &self,
        stage_id: Uuid,
        trigger: TriggerType,
    ) -> RepoResult<Vec<WorkflowDefinition>> {
        let query = format!(
            "SELECT {} FROM workflow_automations \
             WHERE stage_id = $1 AND trigger = $2 AND is_active = true",
            WORKFLOW_COLUMNS
        );
        let rows: Vec<WorkflowRow> = sqlx::query_as(&query)
            .bind(stage_id)
            .bind(trigger.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_all(rows))
    }

    async fn find_active_by_trigger(&self, trigger: TriggerType) -> RepoResult<Vec<WorkflowDefinition>> {
        let query = format!(
            "SELECT {} FROM workflow_automations WHERE trigger = $1 AND is_active = true",
            WORKFLOW_COLUMNS
        );
        let rows: Vec<WorkflowRow> = sqlx::query_as(&query)
            .bind(trigger.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_all(rows))
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<WorkflowDefinition>> {
        let query = format!("SELECT {} FROM workflow_automations WHERE id = $1", WORKFLOW_COLUMNS);
        let row: Option<WorkflowRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkflowDefinition::try_from).transpose()
    }

    async fn find_by_stage(&self, stage_id: Uuid) -> RepoResult<Vec<WorkflowDefinition>> {
        let query = format!(
            "SELECT {} FROM workflow_automations WHERE stage_id = $1 ORDER BY created_at DESC",
            WORKFLOW_COLUMNS
        );
        let rows: Vec<WorkflowRow> = sqlx::query_as(&query)
            .bind(stage_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_all(rows))
    }

    async fn insert(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_automations (
                id, name, description, stage_id, trigger, conditions, actions,
                delay_minutes, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.stage_id)
        .bind(workflow.trigger.as_str())
        .bind(serde_json::to_value(&workflow.conditions)?)
        .bind(serde_json::to_value(&workflow.actions)?)
        .bind(Self::delay_column(workflow)?)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_automations
            SET name = $2, description = $3, trigger = $4, conditions = $5, actions = $6,
                delay_minutes = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger.as_str())
        .bind(serde_json::to_value(&workflow.conditions)?)
        .bind(serde_json::to_value(&workflow.actions)?)
        .bind(Self::delay_column(workflow)?)
        .bind(workflow.is_active)
        .bind(workflow.updated_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("workflow {}", workflow.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM workflow_automations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_automations SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("workflow {}", id)));
        }
        Ok(())
    }
}
