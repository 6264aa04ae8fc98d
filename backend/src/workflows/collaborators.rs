// Workflow Collaborators - Storage and transport seams the engine depends on

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recruit_shared::{
    ApplicationSnapshot, ApplicationStatus, ExecutionRecord, FeedbackRequest, UserContact,
    WorkflowTask,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::WorkflowDefinition;
use super::triggers::TriggerType;
use crate::error::{EmailError, RepositoryError};

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Application data used and mutated by automation.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Snapshot with candidate, job and current stage, or `None` if the application is gone.
    async fn find_stage_transition_context(
        &self,
        application_id: Uuid,
    ) -> RepoResult<Option<ApplicationSnapshot>>;

    /// Applications in `stage_id` last updated at or before `updated_before`,
    /// excluding the given statuses.
    async fn find_applications_in_stage(
        &self,
        stage_id: Uuid,
        updated_before: DateTime<Utc>,
        exclude_statuses: &[ApplicationStatus],
    ) -> RepoResult<Vec<ApplicationSnapshot>>;

    async fn update_stage(&self, application_id: Uuid, stage_id: Uuid) -> RepoResult<()>;

    async fn update_status(&self, application_id: Uuid, status: ApplicationStatus) -> RepoResult<()>;

    /// Replaces the candidate's tag list.
    async fn update_candidate_tags(&self, candidate_id: Uuid, tags: &[String]) -> RepoResult<()>;

    async fn create_task(&self, task: &WorkflowTask) -> RepoResult<()>;

    /// Interviewers from the most recent completed interviews, newest first, deduplicated.
    async fn recent_interviewers(&self, application_id: Uuid, limit: i64) -> RepoResult<Vec<Uuid>>;

    async fn has_submitted_feedback(&self, application_id: Uuid, reviewer_id: Uuid)
    -> RepoResult<bool>;

    async fn create_feedback_request(&self, request: &FeedbackRequest) -> RepoResult<()>;
}

/// Persistent workflow definitions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_active_by_stage_and_trigger(
        &self,
        stage_id: Uuid,
        trigger: TriggerType,
    ) -> RepoResult<Vec<WorkflowDefinition>>;

    async fn find_active_by_trigger(&self, trigger: TriggerType)
    -> RepoResult<Vec<WorkflowDefinition>>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<WorkflowDefinition>>;

    /// All workflows on a stage, active or not.
    async fn find_by_stage(&self, stage_id: Uuid) -> RepoResult<Vec<WorkflowDefinition>>;

    async fn insert(&self, workflow: &WorkflowDefinition) -> RepoResult<()>;

    async fn update(&self, workflow: &WorkflowDefinition) -> RepoResult<()>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;

    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<()>;
}

/// Append-only execution audit plus the claim table backing time-window idempotency.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert_execution_record(&self, record: &ExecutionRecord) -> RepoResult<()>;

    /// Any record for this workflow and application created at or after `since`.
    async fn exists_execution_record(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        since: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Atomically claims one execution window. `false` when it was already claimed.
    async fn claim_execution_window(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> RepoResult<bool>;
}

/// Internal user lookup for hiring managers, recruiters and interviewers.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_email(&self, user_id: Uuid) -> RepoResult<Option<UserContact>>;

    async fn find_users(&self, user_ids: &[Uuid]) -> RepoResult<Vec<UserContact>>;
}

/// A rendered HTML email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}
