// Workflow Store - Validated CRUD over workflow definitions

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::actions::ActionDescriptor;
use super::collaborators::WorkflowRepository;
use super::conditions::ConditionEvaluator;
use super::definition::{self, Conditions, DELAY_HOURS_KEY, MAX_DELAY_HOURS, WorkflowDefinition};
use super::triggers::TriggerType;
use crate::error::RepositoryError;

#[derive(Debug, Error)]
pub enum WorkflowValidationError {
    #[error("Invalid workflow: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("A workflow needs at least one action")]
    NoActions,
    #[error("Action {index} is invalid: {source}")]
    InvalidAction {
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("delayHours must be a positive number of at most {max} hours, got {value}")]
    InvalidDelayHours { value: serde_json::Value, max: f64 },
    #[error("Workflow {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub stage_id: Uuid,
    pub trigger: TriggerType,
    #[serde(default)]
    pub conditions: Conditions,
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    #[validate(range(min = 0, max = 525_600))]
    pub delay_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub trigger: Option<TriggerType>,
    pub conditions: Option<Conditions>,
    pub actions: Option<Vec<ActionDescriptor>>,
    #[validate(range(min = 0, max = 525_600))]
    pub delay_minutes: Option<i64>,
    pub is_active: Option<bool>,
}

fn validate_actions(actions: &[ActionDescriptor]) -> Result<(), WorkflowValidationError> {
    if actions.is_empty() {
        return Err(WorkflowValidationError::NoActions);
    }

    for (index, action) in actions.iter().enumerate() {
        action
            .validate()
            .map_err(|source| WorkflowValidationError::InvalidAction { index, source })?;
    }

    Ok(())
}

/// A null `delayHours` means "use the default"; anything else must parse as a bounded delay.
fn validate_conditions(conditions: &Conditions) -> Result<(), WorkflowValidationError> {
    match conditions.get(DELAY_HOURS_KEY) {
        None | Some(serde_json::Value::Null) => Ok(()),
        Some(_) if definition::delay_hours(conditions).is_some() => Ok(()),
        Some(value) => Err(WorkflowValidationError::InvalidDelayHours {
            value: value.clone(),
            max: MAX_DELAY_HOURS,
        }),
    }
}

fn warn_unknown_conditions(name: &str, conditions: &Conditions) {
    let unknown: Vec<&str> = conditions
        .keys()
        .map(String::as_str)
        .filter(|key| !ConditionEvaluator::is_known_key(key))
        .collect();

    if !unknown.is_empty() {
        warn!(
            "Workflow '{}' uses condition keys the evaluator does not know: {:?}",
            name, unknown
        );
    }
}

#[derive(Clone)]
pub struct WorkflowStore {
    repository: Arc<dyn WorkflowRepository>,
}

impl WorkflowStore {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self { repository }
    }

    /// New workflows start active.
    pub async fn create_workflow(
        &self,
        mut request: CreateWorkflowRequest,
    ) -> Result<WorkflowDefinition, WorkflowValidationError> {
        request.name = request.name.trim().to_string();
        request.validate()?;
        validate_actions(&request.actions)?;
        validate_conditions(&request.conditions)?;
        warn_unknown_conditions(&request.name, &request.conditions);

        let workflow = WorkflowDefinition {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            stage_id: request.stage_id,
            trigger: request.trigger,
            conditions: request.conditions,
            actions: request.actions,
            delay_minutes: request.delay_minutes,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.repository.insert(&workflow).await?;
        info!(
            "Created {} workflow '{}' on stage {}",
            workflow.trigger.as_str(),
            workflow.name,
            workflow.stage_id
        );

        Ok(workflow)
    }

    pub async fn update_workflow(
        &self,
        id: Uuid,
        mut request: UpdateWorkflowRequest,
    ) -> Result<WorkflowDefinition, WorkflowValidationError> {
        if let Some(name) = request.name.as_mut() {
            *name = name.trim().to_string();
        }
        request.validate()?;
        if let Some(actions) = &request.actions {
            validate_actions(actions)?;
        }
        if let Some(conditions) = &request.conditions {
            validate_conditions(conditions)?;
        }

        let mut workflow = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(WorkflowValidationError::NotFound(id))?;

        if let Some(name) = request.name {
            workflow.name = name;
        }
        if request.description.is_some() {
            workflow.description = request.description;
        }
        if let Some(trigger) = request.trigger {
            workflow.trigger = trigger;
        }
        if let Some(conditions) = request.conditions {
            warn_unknown_conditions(&workflow.name, &conditions);
            workflow.conditions = conditions;
        }
        if let Some(actions) = request.actions {
            workflow.actions = actions;
        }
        if let Some(delay_minutes) = request.delay_minutes {
            workflow.delay_minutes = delay_minutes;
        }
        if let Some(is_active) = request.is_active {
            workflow.is_active = is_active;
        }
        workflow.updated_at = Some(Utc::now());

        self.repository.update(&workflow).await?;
        Ok(workflow)
    }

    pub async fn delete_workflow(&self, id: Uuid) -> Result<(), WorkflowValidationError> {
        if !self.repository.delete(id).await? {
            return Err(WorkflowValidationError::NotFound(id));
        }
        info!("Deleted workflow {}", id);
        Ok(())
    }

    /// Takes effect on the next evaluation; runs already in flight are not affected.
    pub async fn toggle_workflow(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<WorkflowDefinition, WorkflowValidationError> {
        let mut workflow = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(WorkflowValidationError::NotFound(id))?;

        self.repository.set_active(id, is_active).await?;
        workflow.is_active = is_active;

        info!(
            "Workflow '{}' {}",
            workflow.name,
            if is_active { "activated" } else { "deactivated" }
        );
        Ok(workflow)
    }

    pub async fn workflows_by_stage(
        &self,
        stage_id: Uuid,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowValidationError> {
        Ok(self.repository.find_by_stage(stage_id).await?)
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<WorkflowDefinition, WorkflowValidationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(WorkflowValidationError::NotFound(id))
    }
}
