use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an application. Terminal statuses end all time-based automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Applied,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const TERMINAL: [ApplicationStatus; 3] = [Self::Hired, Self::Rejected, Self::Withdrawn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "APPLIED",
            Self::Screening => "SCREENING",
            Self::Interview => "INTERVIEW",
            Self::Offer => "OFFER",
            Self::Hired => "HIRED",
            Self::Rejected => "REJECTED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "APPLIED" => Some(Self::Applied),
            "SCREENING" => Some(Self::Screening),
            "INTERVIEW" => Some(Self::Interview),
            "OFFER" => Some(Self::Offer),
            "HIRED" => Some(Self::Hired),
            "REJECTED" => Some(Self::Rejected),
            "WITHDRAWN" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInfo {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl CandidateInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: Uuid,
    pub title: String,
    pub tenant_id: Uuid,
    pub recruiter_id: Option<Uuid>,
    pub hiring_manager_id: Option<Uuid>,
}

/// Point-in-time view of an application with its candidate, job and stage.
///
/// Snapshots are read-only inputs. Writes made by automation go back through the
/// application store and are only visible after the snapshot is read again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSnapshot {
    pub id: Uuid,
    pub status: ApplicationStatus,
    pub current_stage: Option<StageInfo>,
    pub candidate: CandidateInfo,
    pub job: JobInfo,
    pub assigned_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationSnapshot {
    pub fn current_stage_id(&self) -> Option<Uuid> {
        self.current_stage.as_ref().map(|stage| stage.id)
    }

    pub fn stage_name(&self) -> &str {
        self.current_stage
            .as_ref()
            .map(|stage| stage.name.as_str())
            .unwrap_or("")
    }
}

/// Append-only audit entry written once per executed workflow action.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub application_id: Uuid,
    pub action_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(
        workflow_id: Uuid,
        application_id: Uuid,
        action_type: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            application_id,
            action_type: action_type.to_string(),
            metadata: serde_json::json!({
                "workflowId": workflow_id,
                "actionType": action_type,
            }),
            created_at,
        }
    }
}

/// Contact details used to address internal users (recruiters, interviewers).
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

/// Follow-up task raised by an automation for a recruiter or hiring manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    pub assignee_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub due_at: DateTime<Utc>,
}

/// Pending request for interview feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    pub reviewer_id: Uuid,
    pub due_at: DateTime<Utc>,
}
