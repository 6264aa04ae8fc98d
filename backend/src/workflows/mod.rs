// Workflow Automation Engine
//
// Matches pipeline events to stage-bound workflows, evaluates their conditions
// and runs their actions, recording one audit entry per action.

pub mod actions;
pub mod collaborators;
pub mod conditions;
pub mod definition;
pub mod engine;
pub mod executor;
pub mod guard;
pub mod handlers;
pub mod store;
pub mod template;
pub mod triggers;

pub use actions::{
    ActionDescriptor, ActionType, AssigneeType, EmailRecipient, UserTarget,
};
pub use collaborators::{
    ApplicationRepository, AuditRepository, Mailer, OutgoingEmail, UserDirectory,
    WorkflowRepository,
};
pub use conditions::{ConditionEvaluator, ConditionPolicy};
pub use definition::{Conditions, WorkflowDefinition};
pub use engine::{EngineCollaborators, RunStatus, TransitionReport, WorkflowEngine, WorkflowRun};
pub use executor::{ActionDispatcher, ActionHandler, ActionOutcome, ActionResult, ExecutionContext};
pub use guard::{IdempotencyGuard, execution_window_start};
pub use handlers::ActionServices;
pub use store::{CreateWorkflowRequest, UpdateWorkflowRequest, WorkflowStore, WorkflowValidationError};
pub use template::TemplateContext;
pub use triggers::{EventSource, TriggerEvent, TriggerMatcher, TriggerType};
