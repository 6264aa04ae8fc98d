// Workflow Action Handlers - One handler per action type, talking only to collaborators

use async_trait::async_trait;
use chrono::Duration;
use recruit_shared::{ApplicationSnapshot, FeedbackRequest, WorkflowTask};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{
    ActionDescriptor, ActionType, AssigneeType, DEFAULT_FEEDBACK_DUE_DAYS, DEFAULT_TASK_DUE_DAYS,
    EmailRecipient, UserTarget,
};
use super::collaborators::{ApplicationRepository, Mailer, OutgoingEmail, UserDirectory};
use super::executor::{ActionDispatcher, ActionHandler, ExecutionContext};
use super::template::TemplateContext;
use crate::error::ActionError;

pub const DEFAULT_EMAIL_SUBJECT: &str = "Update on your application";
const DEFAULT_TASK_TITLE: &str = "Follow up on application";
const RECENT_INTERVIEW_LIMIT: i64 = 5;

type HandlerResult = Result<Option<Value>, ActionError>;

/// Collaborators shared by every built-in handler
#[derive(Clone)]
pub struct ActionServices {
    pub applications: Arc<dyn ApplicationRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
}

impl ActionServices {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            applications,
            users,
            mailer,
        }
    }

    /// Current state of the application; earlier actions in the same run may have changed it.
    async fn reload(&self, context: &ExecutionContext) -> Result<ApplicationSnapshot, ActionError> {
        self.applications
            .find_stage_transition_context(context.application_id())
            .await?
            .ok_or_else(|| ActionError::resolution(format!("application {}", context.application_id())))
    }

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>, ActionError> {
        Ok(self
            .users
            .find_user_email(user_id)
            .await?
            .map(|user| user.email)
            .filter(|email| !email.trim().is_empty()))
    }
}

impl ActionDispatcher {
    /// Dispatcher with every built-in action type registered.
    pub fn with_defaults(services: ActionServices) -> Self {
        Self::new()
            .with_handler(ActionType::SendEmail, Arc::new(SendEmailHandler(services.clone())))
            .with_handler(ActionType::AddTag, Arc::new(AddTagHandler(services.clone())))
            .with_handler(ActionType::CreateTask, Arc::new(CreateTaskHandler(services.clone())))
            .with_handler(
                ActionType::RequestFeedback,
                Arc::new(RequestFeedbackHandler(services.clone())),
            )
            .with_handler(ActionType::MoveStage, Arc::new(MoveStageHandler(services.clone())))
            .with_handler(ActionType::NotifyUser, Arc::new(NotifyUserHandler(services.clone())))
            .with_handler(ActionType::UpdateStatus, Arc::new(UpdateStatusHandler(services)))
    }
}

fn mismatched(expected: ActionType, action: &ActionDescriptor) -> ActionError {
    ActionError::configuration(format!(
        "{} handler received a {} action",
        expected,
        action.action_type()
    ))
}

// ===== SEND_EMAIL =====

pub struct SendEmailHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for SendEmailHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::SendEmail(config) = action else {
            return Err(mismatched(ActionType::SendEmail, action));
        };

        let application = self.0.reload(context).await?;

        let to = match &config.to {
            EmailRecipient::Candidate => Some(application.candidate.email.clone())
                .filter(|email| !email.trim().is_empty()),
            EmailRecipient::HiringManager => match application.job.hiring_manager_id {
                Some(manager_id) => self.0.user_email(manager_id).await?,
                None => None,
            },
            EmailRecipient::Address(address) => Some(address.clone()),
        }
        .ok_or_else(|| {
            ActionError::resolution(format!("SEND_EMAIL recipient {}", String::from(config.to.clone())))
        })?;

        let templates = TemplateContext::from_snapshot(&application);
        let subject = templates.render(config.subject.as_deref().unwrap_or(DEFAULT_EMAIL_SUBJECT));
        let html = templates.render(&config.body);

        self.0
            .mailer
            .send(&OutgoingEmail {
                to: to.clone(),
                subject: subject.clone(),
                html,
            })
            .await?;

        info!("Sent workflow email to {} for application {}", to, application.id);
        Ok(Some(json!({ "to": to, "subject": subject })))
    }
}

// ===== ADD_TAG =====

pub struct AddTagHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for AddTagHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::AddTag(config) = action else {
            return Err(mismatched(ActionType::AddTag, action));
        };

        let tag = config.tag.trim();
        if tag.is_empty() {
            return Err(ActionError::configuration("ADD_TAG without a tag"));
        }

        let application = self.0.reload(context).await?;
        let mut tags = application.candidate.tags;

        if tags.iter().any(|existing| existing == tag) {
            return Ok(Some(json!({ "tag": tag, "added": false })));
        }

        tags.push(tag.to_string());
        self.0
            .applications
            .update_candidate_tags(application.candidate.id, &tags)
            .await?;

        info!("Tagged candidate {} with '{}'", application.candidate.id, tag);
        Ok(Some(json!({ "tag": tag, "added": true })))
    }
}

// ===== CREATE_TASK =====

pub struct CreateTaskHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for CreateTaskHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::CreateTask(config) = action else {
            return Err(mismatched(ActionType::CreateTask, action));
        };

        let assignee_type = config
            .assignee_type
            .ok_or_else(|| ActionError::configuration("CREATE_TASK without an assigneeType"))?;

        let application = self.0.reload(context).await?;
        let assignee_id = match assignee_type {
            AssigneeType::Recruiter => application.job.recruiter_id,
            AssigneeType::HiringManager => application.job.hiring_manager_id,
            AssigneeType::AssignedTo => application.assigned_to_id,
        }
        .ok_or_else(|| ActionError::resolution("CREATE_TASK assignee"))?;

        let templates = TemplateContext::from_snapshot(&application);
        let title = templates.render(config.title.as_deref().unwrap_or(DEFAULT_TASK_TITLE));
        let description = templates.render(config.description.as_deref().unwrap_or_default());
        let due_at =
            context.now + Duration::days(config.due_in_days.unwrap_or(DEFAULT_TASK_DUE_DAYS));

        let task = WorkflowTask {
            application_id: application.id,
            candidate_id: application.candidate.id,
            assignee_id,
            title: title.clone(),
            description: description.clone(),
            priority: config.priority.unwrap_or_default(),
            due_at,
        };
        self.0.applications.create_task(&task).await?;

        // The task exists at this point; a failed notification does not undo it.
        match self.0.users.find_user_email(assignee_id).await {
            Ok(Some(assignee)) if !assignee.email.is_empty() => {
                let email = OutgoingEmail {
                    to: assignee.email,
                    subject: format!("Task: {}", title),
                    html: format!(
                        "<p>Hi {},</p><p>A new task has been created for you:</p>\
                         <p><strong>{}</strong></p><p>{}</p><p><strong>Due:</strong> {}</p>\
                         <p>Please review the application in the system.</p>",
                        assignee.first_name,
                        title,
                        description,
                        due_at.format("%Y-%m-%d")
                    ),
                };
                if let Err(e) = self.0.mailer.send(&email).await {
                    warn!("Failed to send task notification to {}: {}", assignee_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to look up task assignee {}: {}", assignee_id, e),
        }

        info!("Created task '{}' for user {}", title, assignee_id);
        Ok(Some(json!({
            "assigneeId": assignee_id,
            "title": title,
            "priority": task.priority.as_str(),
            "dueAt": due_at,
        })))
    }
}

// ===== REQUEST_FEEDBACK =====

pub struct RequestFeedbackHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for RequestFeedbackHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::RequestFeedback(config) = action else {
            return Err(mismatched(ActionType::RequestFeedback, action));
        };

        let application = self.0.reload(context).await?;

        let interviewer_ids = if config.interviewer_ids.is_empty() {
            self.0
                .applications
                .recent_interviewers(application.id, RECENT_INTERVIEW_LIMIT)
                .await?
        } else {
            config.interviewer_ids.clone()
        };

        if interviewer_ids.is_empty() {
            return Err(ActionError::resolution("REQUEST_FEEDBACK interviewers"));
        }

        let due_at = context.now
            + Duration::days(config.due_in_days.unwrap_or(DEFAULT_FEEDBACK_DUE_DAYS));
        let interviewers = self.0.users.find_users(&interviewer_ids).await?;

        let templates = TemplateContext::from_snapshot(&application);
        let candidate_name = application.candidate.full_name();
        let job_title = &application.job.title;
        let message = match &config.message {
            Some(message) => templates.render(message),
            None => format!("Please provide your feedback for {}'s interview.", candidate_name),
        };

        let mut requested = Vec::new();
        let mut already_submitted = 0;

        for interviewer in interviewers {
            if self
                .0
                .applications
                .has_submitted_feedback(application.id, interviewer.id)
                .await?
            {
                already_submitted += 1;
                continue;
            }

            self.0
                .applications
                .create_feedback_request(&FeedbackRequest {
                    application_id: application.id,
                    candidate_id: application.candidate.id,
                    reviewer_id: interviewer.id,
                    due_at,
                })
                .await?;
            requested.push(interviewer.id);

            let email = OutgoingEmail {
                to: interviewer.email.clone(),
                subject: format!("Feedback Requested: {} - {}", candidate_name, job_title),
                html: format!(
                    "<p>Hi {},</p><p>{}</p><p><strong>Candidate:</strong> {}</p>\
                     <p><strong>Position:</strong> {}</p><p><strong>Please submit by:</strong> {}</p>",
                    interviewer.first_name,
                    message,
                    candidate_name,
                    job_title,
                    due_at.format("%Y-%m-%d")
                ),
            };
            if let Err(e) = self.0.mailer.send(&email).await {
                warn!(
                    "Failed to send feedback request to {}: {}",
                    interviewer.email, e
                );
            }
        }

        info!(
            "Requested feedback from {} interviewers for application {}",
            requested.len(),
            application.id
        );
        Ok(Some(json!({
            "requested": requested,
            "alreadySubmitted": already_submitted,
        })))
    }
}

// ===== MOVE_STAGE =====

pub struct MoveStageHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for MoveStageHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::MoveStage(config) = action else {
            return Err(mismatched(ActionType::MoveStage, action));
        };

        let target = config
            .target_stage_id
            .ok_or_else(|| ActionError::configuration("MOVE_STAGE without a targetStageId"))?;

        // Direct write: no STAGE_ENTER/STAGE_EXIT is raised for this move.
        self.0
            .applications
            .update_stage(context.application_id(), target)
            .await?;

        info!("Moved application {} to stage {}", context.application_id(), target);
        Ok(Some(json!({ "targetStageId": target })))
    }
}

// ===== NOTIFY_USER =====

pub struct NotifyUserHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for NotifyUserHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::NotifyUser(config) = action else {
            return Err(mismatched(ActionType::NotifyUser, action));
        };

        let target = config
            .user_id
            .ok_or_else(|| ActionError::configuration("NOTIFY_USER without a userId"))?;

        let application = self.0.reload(context).await?;
        let user_id = match target {
            UserTarget::AssignedTo => application.assigned_to_id,
            UserTarget::Recruiter => application.job.recruiter_id,
            UserTarget::User(id) => Some(id),
        }
        .ok_or_else(|| {
            ActionError::resolution(format!("NOTIFY_USER target {}", String::from(target)))
        })?;

        let to = self
            .0
            .user_email(user_id)
            .await?
            .ok_or_else(|| ActionError::resolution(format!("email for user {}", user_id)))?;

        let templates = TemplateContext::from_snapshot(&application);
        let html = templates.render(config.message.as_deref().unwrap_or_default());

        self.0
            .mailer
            .send(&OutgoingEmail {
                to,
                subject: format!("Action Required: {}", application.job.title),
                html,
            })
            .await?;

        info!("Notified user {} about application {}", user_id, application.id);
        Ok(Some(json!({ "userId": user_id })))
    }
}

// ===== UPDATE_STATUS =====

pub struct UpdateStatusHandler(pub ActionServices);

#[async_trait]
impl ActionHandler for UpdateStatusHandler {
    async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> HandlerResult {
        let ActionDescriptor::UpdateStatus(config) = action else {
            return Err(mismatched(ActionType::UpdateStatus, action));
        };

        let status = config
            .status
            .ok_or_else(|| ActionError::configuration("UPDATE_STATUS without a status"))?;

        self.0
            .applications
            .update_status(context.application_id(), status)
            .await?;

        info!("Set application {} status to {}", context.application_id(), status);
        Ok(Some(json!({ "status": status })))
    }
}
