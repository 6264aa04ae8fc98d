// Workflow Triggers - Pipeline events that make workflows eligible to run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::collaborators::WorkflowRepository;
use super::definition::WorkflowDefinition;

/// Event classes a workflow can be bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    StageEnter,
    StageExit,
    TimeInStage,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageEnter => "STAGE_ENTER",
            Self::StageExit => "STAGE_EXIT",
            Self::TimeInStage => "TIME_IN_STAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STAGE_ENTER" => Some(Self::StageEnter),
            "STAGE_EXIT" => Some(Self::StageExit),
            "TIME_IN_STAGE" => Some(Self::TimeInStage),
            _ => None,
        }
    }

    /// Immediate triggers fire on a stage transition; time-based ones only from the sweep.
    pub fn is_immediate(&self) -> bool {
        !matches!(self, Self::TimeInStage)
    }
}

/// Source of the trigger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    User(Uuid),
    System,
    Scheduler,
}

/// A lifecycle event concerning one application and one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub application_id: Uuid,
    pub stage_id: Uuid,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(
        trigger_type: TriggerType,
        application_id: Uuid,
        stage_id: Uuid,
        source: EventSource,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            application_id,
            stage_id,
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_entered(application_id: Uuid, stage_id: Uuid, source: EventSource) -> Self {
        Self::new(TriggerType::StageEnter, application_id, stage_id, source)
    }

    pub fn stage_exited(application_id: Uuid, stage_id: Uuid, source: EventSource) -> Self {
        Self::new(TriggerType::StageExit, application_id, stage_id, source)
    }

    pub fn time_in_stage(application_id: Uuid, stage_id: Uuid) -> Self {
        Self::new(
            TriggerType::TimeInStage,
            application_id,
            stage_id,
            EventSource::Scheduler,
        )
    }
}

/// Selects the active workflows bound to a stage for a given trigger.
#[derive(Clone)]
pub struct TriggerMatcher {
    workflows: Arc<dyn WorkflowRepository>,
}

impl TriggerMatcher {
    pub fn new(workflows: Arc<dyn WorkflowRepository>) -> Self {
        Self { workflows }
    }

    /// Returns every active workflow on `stage_id` whose trigger equals `trigger`.
    /// Order between the returned workflows is unspecified. An unreachable store
    /// yields an empty list.
    pub async fn match_workflows(
        &self,
        trigger: TriggerType,
        stage_id: Uuid,
    ) -> Vec<WorkflowDefinition> {
        let candidates = match self
            .workflows
            .find_active_by_stage_and_trigger(stage_id, trigger)
            .await
        {
            Ok(workflows) => workflows,
            Err(e) => {
                error!(
                    "Failed to load {} workflows for stage {}: {}",
                    trigger.as_str(),
                    stage_id,
                    e
                );
                return Vec::new();
            }
        };

        let matched: Vec<WorkflowDefinition> = candidates
            .into_iter()
            .filter(|workflow| {
                workflow.is_active && workflow.trigger == trigger && workflow.stage_id == stage_id
            })
            .collect();

        debug!(
            "Matched {} {} workflows for stage {}",
            matched.len(),
            trigger.as_str(),
            stage_id
        );

        matched
    }
}
