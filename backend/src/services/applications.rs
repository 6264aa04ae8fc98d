use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recruit_shared::{
    ApplicationSnapshot, ApplicationStatus, CandidateInfo, FeedbackRequest, JobInfo, StageInfo,
    WorkflowTask,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::workflows::ApplicationRepository;
use crate::workflows::collaborators::RepoResult;

const SNAPSHOT_SELECT: &str = r#"
    SELECT
        a.id, a.status, a.assigned_to_id, a.created_at, a.updated_at,
        s.id AS stage_id, s.name AS stage_name,
        c.id AS candidate_id, c.first_name, c.last_name, c.email, c.source,
        COALESCE(c.tags, '{}') AS tags, COALESCE(c.skills, '{}') AS skills,
        j.id AS job_id, j.title AS job_title, j.tenant_id, j.recruiter_id, j.hiring_manager_id
    FROM applications a
    JOIN candidates c ON c.id = a.candidate_id
    JOIN jobs j ON j.id = a.job_id
    LEFT JOIN pipeline_stages s ON s.id = a.current_stage_id
"#;

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: Uuid,
    status: String,
    assigned_to_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    stage_id: Option<Uuid>,
    stage_name: Option<String>,
    candidate_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    source: Option<String>,
    tags: Vec<String>,
    skills: Vec<String>,
    job_id: Uuid,
    job_title: String,
    tenant_id: Uuid,
    recruiter_id: Option<Uuid>,
    hiring_manager_id: Option<Uuid>,
}

impl TryFrom<ApplicationRow> for ApplicationSnapshot {
    type Error = RepositoryError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let status = ApplicationStatus::parse(&row.status).ok_or_else(|| {
            RepositoryError::InvalidData(format!(
                "application {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        let current_stage = row.stage_id.map(|id| StageInfo {
            id,
            name: row.stage_name.unwrap_or_default(),
        });

        Ok(ApplicationSnapshot {
            id: row.id,
            status,
            current_stage,
            candidate: CandidateInfo {
                id: row.candidate_id,
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                source: row.source,
                tags: row.tags,
                skills: row.skills,
            },
            job: JobInfo {
                id: row.job_id,
                title: row.job_title,
                tenant_id: row.tenant_id,
                recruiter_id: row.recruiter_id,
                hiring_manager_id: row.hiring_manager_id,
            },
            assigned_to_id: row.assigned_to_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Decodes sweep candidates, logging and skipping rows that no longer parse
/// so one bad application leaves the rest of the tick intact.
fn decode_due(rows: Vec<ApplicationRow>) -> Vec<ApplicationSnapshot> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            ApplicationSnapshot::try_from(row)
                .map_err(|e| tracing::error!("Skipping unreadable application {}: {}", id, e))
                .ok()
        })
        .collect()
}

/// Reads and writes against the applicant-tracking tables
#[derive(Debug, Clone)]
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn find_stage_transition_context(
        &self,
        application_id: Uuid,
    ) -> RepoResult<Option<ApplicationSnapshot>> {
        let query = format!("{} WHERE a.id = $1", SNAPSHOT_SELECT);
        let row: Option<ApplicationRow> = sqlx::query_as(&query)
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ApplicationSnapshot::try_from).transpose()
    }

    async fn find_applications_in_stage(
        &self,
        stage_id: Uuid,
        updated_before: DateTime<Utc>,
        exclude_statuses: &[ApplicationStatus],
    ) -> RepoResult<Vec<ApplicationSnapshot>> {
        let excluded: Vec<&str> = exclude_statuses.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "{} WHERE a.current_stage_id = $1 AND a.updated_at <= $2 AND NOT (a.status = ANY($3)) \
             ORDER BY a.updated_at ASC",
            SNAPSHOT_SELECT
        );

        let rows: Vec<ApplicationRow> = sqlx::query_as(&query)
            .bind(stage_id)
            .bind(updated_before)
            .bind(excluded)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_due(rows))
    }

    async fn update_stage(&self, application_id: Uuid, stage_id: Uuid) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE applications SET current_stage_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(application_id)
        .bind(stage_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("application {}", application_id)));
        }
        Ok(())
    }

    async fn update_status(&self, application_id: Uuid, status: ApplicationStatus) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE applications SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(application_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("application {}", application_id)));
        }
        Ok(())
    }

    async fn update_candidate_tags(&self, candidate_id: Uuid, tags: &[String]) -> RepoResult<()> {
        sqlx::query("UPDATE candidates SET tags = $2, updated_at = NOW() WHERE id = $1")
            .bind(candidate_id)
            .bind(tags)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_task(&self, task: &WorkflowTask) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_tasks (
                application_id, candidate_id, assignee_id, title, description, priority, due_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.application_id)
        .bind(task.candidate_id)
        .bind(task.assignee_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(task.due_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_interviewers(&self, application_id: Uuid, limit: i64) -> RepoResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT interviewer_id
            FROM interviews
            WHERE application_id = $1 AND status = 'COMPLETED'
            ORDER BY scheduled_at DESC
            LIMIT $2
            "#,
        )
        .bind(application_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut interviewers: Vec<Uuid> = Vec::with_capacity(rows.len());
        for (id,) in rows {
            if !interviewers.contains(&id) {
                interviewers.push(id);
            }
        }
        Ok(interviewers)
    }

    async fn has_submitted_feedback(
        &self,
        application_id: Uuid,
        reviewer_id: Uuid,
    ) -> RepoResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM interview_feedback f
                JOIN interviews i ON i.id = f.interview_id
                WHERE i.application_id = $1 AND f.reviewer_id = $2
            )
            "#,
        )
        .bind(application_id)
        .bind(reviewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn create_feedback_request(&self, request: &FeedbackRequest) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback_requests (application_id, candidate_id, reviewer_id, due_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(request.application_id)
        .bind(request.candidate_id)
        .bind(request.reviewer_id)
        .bind(request.due_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
