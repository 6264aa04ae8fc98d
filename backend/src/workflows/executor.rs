// Workflow Executor - Registry of action handlers and the isolated per-action boundary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recruit_shared::ApplicationSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::actions::{ActionDescriptor, ActionType};
use super::triggers::TriggerType;
use crate::error::ActionError;

/// Context for one workflow run against one application
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub trigger: TriggerType,
    /// Snapshot the workflow was evaluated against. Handlers re-read before mutating.
    pub application: ApplicationSnapshot,
    pub now: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn application_id(&self) -> Uuid {
        self.application.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Completed,
    /// Configuration or resolution problem; logged as a warning.
    Skipped,
    Failed,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_type: ActionType,
    pub outcome: ActionOutcome,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl ActionResult {
    pub fn completed(action_type: ActionType, output: Option<serde_json::Value>) -> Self {
        Self {
            action_type,
            outcome: ActionOutcome::Completed,
            output,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn skipped(action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            outcome: ActionOutcome::Skipped,
            output: None,
            error: Some(reason.into()),
            duration_ms: 0,
        }
    }

    pub fn failed(action_type: ActionType, error: impl Into<String>) -> Self {
        Self {
            action_type,
            outcome: ActionOutcome::Failed,
            output: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == ActionOutcome::Completed
    }
}

/// One concrete effect, registered for one action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        action: &ActionDescriptor,
        context: &ExecutionContext,
    ) -> Result<Option<serde_json::Value>, ActionError>;
}

/// Maps action types to handlers. Adding an action type means registering a handler.
#[derive(Clone, Default)]
pub struct ActionDispatcher {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `action_type`, returning the handler it replaced.
    pub fn register(
        &mut self,
        action_type: ActionType,
        handler: Arc<dyn ActionHandler>,
    ) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.insert(action_type, handler)
    }

    pub fn with_handler(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action_type, handler);
        self
    }

    pub fn handles(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    /// Runs one action. Never returns an error: configuration and resolution
    /// problems become `Skipped`, anything else (including a panic) `Failed`.
    pub async fn execute(&self, action: &ActionDescriptor, context: &ExecutionContext) -> ActionResult {
        let start = Instant::now();
        let action_type = action.action_type();

        let Some(handler) = self.handlers.get(&action_type).cloned() else {
            warn!(
                "No handler registered for {} in workflow '{}'",
                action_type, context.workflow_name
            );
            return ActionResult::skipped(action_type, "no handler registered");
        };

        info!(
            "Executing {} for application {} (workflow '{}')",
            action_type,
            context.application_id(),
            context.workflow_name
        );

        let owned_action = action.clone();
        let owned_context = context.clone();
        let joined =
            tokio::spawn(async move { handler.execute(&owned_action, &owned_context).await }).await;

        let mut result = match joined {
            Ok(Ok(output)) => ActionResult::completed(action_type, output),
            Ok(Err(e)) if e.is_skip() => {
                warn!(
                    "Skipping {} for application {}: {}",
                    action_type,
                    context.application_id(),
                    e
                );
                ActionResult::skipped(action_type, e.to_string())
            }
            Ok(Err(e)) => {
                error!(
                    "{} failed for application {}: {}",
                    action_type,
                    context.application_id(),
                    e
                );
                ActionResult::failed(action_type, e.to_string())
            }
            Err(join_error) => {
                error!(
                    "{} aborted for application {}: {}",
                    action_type,
                    context.application_id(),
                    join_error
                );
                ActionResult::failed(action_type, format!("action aborted: {}", join_error))
            }
        };

        result.duration_ms = start.elapsed().as_millis() as i64;
        result
    }
}
