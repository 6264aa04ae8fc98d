// Workflow Actions - Typed action descriptors and their per-type configuration

use recruit_shared::{ApplicationStatus, TaskPriority};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

/// Tag identifying an action handler
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    SendEmail,
    AddTag,
    CreateTask,
    RequestFeedback,
    MoveStage,
    NotifyUser,
    UpdateStatus,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        Self::SendEmail,
        Self::AddTag,
        Self::CreateTask,
        Self::RequestFeedback,
        Self::MoveStage,
        Self::NotifyUser,
        Self::UpdateStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "SEND_EMAIL",
            Self::AddTag => "ADD_TAG",
            Self::CreateTask => "CREATE_TASK",
            Self::RequestFeedback => "REQUEST_FEEDBACK",
            Self::MoveStage => "MOVE_STAGE",
            Self::NotifyUser => "NOTIFY_USER",
            Self::UpdateStatus => "UPDATE_STATUS",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side effect of a workflow, with configuration typed per action.
///
/// Serialized as `{"type": "SEND_EMAIL", "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionDescriptor {
    SendEmail(SendEmailConfig),
    AddTag(AddTagConfig),
    CreateTask(CreateTaskConfig),
    RequestFeedback(RequestFeedbackConfig),
    MoveStage(MoveStageConfig),
    NotifyUser(NotifyUserConfig),
    UpdateStatus(UpdateStatusConfig),
}

/// Who receives a `SEND_EMAIL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmailRecipient {
    Candidate,
    HiringManager,
    Address(String),
}

impl From<String> for EmailRecipient {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CANDIDATE" => Self::Candidate,
            "HIRING_MANAGER" => Self::HiringManager,
            _ => Self::Address(value),
        }
    }
}

impl From<EmailRecipient> for String {
    fn from(value: EmailRecipient) -> Self {
        match value {
            EmailRecipient::Candidate => "CANDIDATE".to_string(),
            EmailRecipient::HiringManager => "HIRING_MANAGER".to_string(),
            EmailRecipient::Address(address) => address,
        }
    }
}

/// Who receives a `NOTIFY_USER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UserTarget {
    AssignedTo,
    Recruiter,
    User(Uuid),
}

impl TryFrom<String> for UserTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "ASSIGNED_TO" => Ok(Self::AssignedTo),
            "RECRUITER" => Ok(Self::Recruiter),
            other => Uuid::parse_str(other)
                .map(Self::User)
                .map_err(|_| format!("'{}' is neither ASSIGNED_TO, RECRUITER nor a user id", other)),
        }
    }
}

impl From<UserTarget> for String {
    fn from(value: UserTarget) -> Self {
        match value {
            UserTarget::AssignedTo => "ASSIGNED_TO".to_string(),
            UserTarget::Recruiter => "RECRUITER".to_string(),
            UserTarget::User(id) => id.to_string(),
        }
    }
}

/// Who owns a task created by `CREATE_TASK`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssigneeType {
    Recruiter,
    HiringManager,
    AssignedTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailConfig {
    pub to: EmailRecipient,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTagConfig {
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTaskConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_type: Option<AssigneeType>,
    pub due_in_days: Option<i64>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestFeedbackConfig {
    pub interviewer_ids: Vec<Uuid>,
    pub message: Option<String>,
    pub due_in_days: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveStageConfig {
    pub target_stage_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyUserConfig {
    pub user_id: Option<UserTarget>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStatusConfig {
    pub status: Option<ApplicationStatus>,
}

pub const DEFAULT_TASK_DUE_DAYS: i64 = 3;
pub const DEFAULT_FEEDBACK_DUE_DAYS: i64 = 2;

fn invalid(code: &'static str, message: &str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.to_string().into());
    error
}

impl ActionDescriptor {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::AddTag(_) => ActionType::AddTag,
            Self::CreateTask(_) => ActionType::CreateTask,
            Self::RequestFeedback(_) => ActionType::RequestFeedback,
            Self::MoveStage(_) => ActionType::MoveStage,
            Self::NotifyUser(_) => ActionType::NotifyUser,
            Self::UpdateStatus(_) => ActionType::UpdateStatus,
        }
    }

    /// Create-time check of the fields each action needs to run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::SendEmail(config) => {
                if let EmailRecipient::Address(address) = &config.to {
                    if address.trim().is_empty() {
                        return Err(invalid("send_email_to", "SEND_EMAIL requires a recipient"));
                    }
                    if !address.contains('@') {
                        return Err(invalid(
                            "send_email_to",
                            "SEND_EMAIL recipient must be CANDIDATE, HIRING_MANAGER or an email address",
                        ));
                    }
                }
                if config.body.trim().is_empty() {
                    return Err(invalid("send_email_body", "SEND_EMAIL requires a body"));
                }
            }
            Self::AddTag(config) => {
                if config.tag.trim().is_empty() {
                    return Err(invalid("add_tag_tag", "ADD_TAG requires a tag"));
                }
            }
            Self::CreateTask(config) => {
                if config.assignee_type.is_none() {
                    return Err(invalid(
                        "create_task_assignee",
                        "CREATE_TASK requires an assigneeType",
                    ));
                }
                if config.due_in_days.is_some_and(|days| days < 0) {
                    return Err(invalid("create_task_due", "dueInDays cannot be negative"));
                }
            }
            Self::RequestFeedback(config) => {
                if config.due_in_days.is_some_and(|days| days < 0) {
                    return Err(invalid("request_feedback_due", "dueInDays cannot be negative"));
                }
            }
            Self::MoveStage(config) => {
                if config.target_stage_id.is_none() {
                    return Err(invalid(
                        "move_stage_target",
                        "MOVE_STAGE requires a targetStageId",
                    ));
                }
            }
            Self::NotifyUser(config) => {
                if config.user_id.is_none() {
                    return Err(invalid("notify_user_target", "NOTIFY_USER requires a userId"));
                }
            }
            Self::UpdateStatus(config) => {
                if config.status.is_none() {
                    return Err(invalid("update_status_status", "UPDATE_STATUS requires a status"));
                }
            }
        }

        Ok(())
    }

    // ===== Builders =====

    pub fn send_email(to: EmailRecipient, subject: Option<&str>, body: &str) -> Self {
        Self::SendEmail(SendEmailConfig {
            to,
            subject: subject.map(str::to_string),
            body: body.to_string(),
        })
    }

    pub fn add_tag(tag: &str) -> Self {
        Self::AddTag(AddTagConfig {
            tag: tag.to_string(),
        })
    }

    pub fn move_stage(target_stage_id: Uuid) -> Self {
        Self::MoveStage(MoveStageConfig {
            target_stage_id: Some(target_stage_id),
        })
    }

    pub fn notify_user(target: UserTarget, message: &str) -> Self {
        Self::NotifyUser(NotifyUserConfig {
            user_id: Some(target),
            message: Some(message.to_string()),
        })
    }

    pub fn update_status(status: ApplicationStatus) -> Self {
        Self::UpdateStatus(UpdateStatusConfig {
            status: Some(status),
        })
    }

    pub fn create_task(assignee: AssigneeType, title: &str) -> Self {
        Self::CreateTask(CreateTaskConfig {
            title: Some(title.to_string()),
            assignee_type: Some(assignee),
            ..CreateTaskConfig::default()
        })
    }

    pub fn request_feedback(interviewer_ids: Vec<Uuid>) -> Self {
        Self::RequestFeedback(RequestFeedbackConfig {
            interviewer_ids,
            ..RequestFeedbackConfig::default()
        })
    }
}
