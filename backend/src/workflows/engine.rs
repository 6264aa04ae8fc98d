// Workflow Engine - Runs matched workflows for stage transitions and time-in-stage sweeps

use chrono::{DateTime, Utc};
use recruit_shared::{ApplicationSnapshot, ExecutionRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::collaborators::{
    ApplicationRepository, AuditRepository, Mailer, UserDirectory, WorkflowRepository,
};
use super::conditions::{ConditionEvaluator, ConditionPolicy};
use super::definition::WorkflowDefinition;
use super::executor::{ActionDispatcher, ActionResult, ExecutionContext};
use super::handlers::ActionServices;
use super::triggers::{EventSource, TriggerEvent, TriggerMatcher, TriggerType};
use crate::clock::Clock;

/// Everything the engine talks to
#[derive(Clone)]
pub struct EngineCollaborators {
    pub workflows: Arc<dyn WorkflowRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every action was attempted and recorded.
    Executed,
    ConditionsNotMet,
    /// Deferred enter trigger whose application left the stage before it fired.
    NoLongerInStage,
    /// Workflow was deactivated or deleted before a deferred trigger fired.
    Deactivated,
}

/// Outcome of one workflow against one application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub application_id: Uuid,
    pub trigger: TriggerType,
    pub status: RunStatus,
    pub actions: Vec<ActionResult>,
    pub records_written: usize,
    pub started_at: DateTime<Utc>,
}

impl WorkflowRun {
    fn without_actions(
        workflow: &WorkflowDefinition,
        application_id: Uuid,
        trigger: TriggerType,
        status: RunStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            application_id,
            trigger,
            status,
            actions: Vec::new(),
            records_written: 0,
            started_at,
        }
    }

    pub fn executed(&self) -> bool {
        self.status == RunStatus::Executed
    }
}

/// What a stage transition set in motion. Deferred runs keep going after this is returned.
#[derive(Debug, Default)]
pub struct TransitionReport {
    pub runs: Vec<WorkflowRun>,
    pub deferred: Vec<JoinHandle<Option<WorkflowRun>>>,
}

impl TransitionReport {
    /// Waits for every deferred run to fire.
    pub async fn wait_deferred(self) -> Vec<WorkflowRun> {
        let mut runs = self.runs;
        for handle in self.deferred {
            match handle.await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => error!("Deferred workflow task aborted: {}", e),
            }
        }
        runs
    }
}

struct EngineInner {
    matcher: TriggerMatcher,
    evaluator: ConditionEvaluator,
    dispatcher: ActionDispatcher,
    workflows: Arc<dyn WorkflowRepository>,
    applications: Arc<dyn ApplicationRepository>,
    audit: Arc<dyn AuditRepository>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub fn new(collaborators: EngineCollaborators, policy: ConditionPolicy) -> Self {
        let dispatcher = ActionDispatcher::with_defaults(ActionServices::new(
            collaborators.applications.clone(),
            collaborators.users.clone(),
            collaborators.mailer.clone(),
        ));
        Self::with_dispatcher(collaborators, policy, dispatcher)
    }

    pub fn with_dispatcher(
        collaborators: EngineCollaborators,
        policy: ConditionPolicy,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                matcher: TriggerMatcher::new(collaborators.workflows.clone()),
                evaluator: ConditionEvaluator::new(policy),
                dispatcher,
                workflows: collaborators.workflows,
                applications: collaborators.applications,
                audit: collaborators.audit,
                clock: collaborators.clock,
            }),
        }
    }

    pub fn matcher(&self) -> &TriggerMatcher {
        &self.inner.matcher
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Fires `STAGE_EXIT` for the old stage and `STAGE_ENTER` for the new one.
    ///
    /// Best effort: nothing here can fail the stage move that triggered it.
    pub async fn handle_stage_transition(
        &self,
        application_id: Uuid,
        new_stage_id: Uuid,
        old_stage_id: Option<Uuid>,
    ) -> TransitionReport {
        let mut report = TransitionReport::default();

        let Some(application) = self.load_snapshot(application_id).await else {
            return report;
        };

        if let Some(old_stage_id) = old_stage_id.filter(|old| *old != new_stage_id) {
            let exit = TriggerEvent::stage_exited(
                application_id,
                old_stage_id,
                EventSource::System,
            );
            self.fire(&exit, &application, &mut report).await;
        }

        let enter = TriggerEvent::stage_entered(
            application_id,
            new_stage_id,
            EventSource::System,
        );
        self.fire(&enter, &application, &mut report).await;

        report
    }

    /// Handles one immediate trigger event. `TIME_IN_STAGE` is owned by the sweep.
    pub async fn process_event(&self, event: &TriggerEvent) -> TransitionReport {
        let mut report = TransitionReport::default();

        if !event.trigger_type.is_immediate() {
            warn!(
                "Ignoring {} event {}; time-based triggers run from the scheduler",
                event.trigger_type.as_str(),
                event.event_id
            );
            return report;
        }

        if let Some(application) = self.load_snapshot(event.application_id).await {
            self.fire(event, &application, &mut report).await;
        }

        report
    }

    async fn fire(
        &self,
        event: &TriggerEvent,
        application: &ApplicationSnapshot,
        report: &mut TransitionReport,
    ) {
        let workflows = self
            .inner
            .matcher
            .match_workflows(event.trigger_type, event.stage_id)
            .await;

        for workflow in workflows {
            match workflow.firing_delay() {
                Some(delay) => {
                    report
                        .deferred
                        .push(self.spawn_deferred(workflow, event.clone(), delay));
                }
                None => {
                    let run = self
                        .run_workflow(&workflow, application, event.trigger_type)
                        .await;
                    report.runs.push(run);
                }
            }
        }
    }

    fn spawn_deferred(
        &self,
        workflow: WorkflowDefinition,
        event: TriggerEvent,
        delay: chrono::Duration,
    ) -> JoinHandle<Option<WorkflowRun>> {
        let engine = self.clone();
        let sleep_for = delay.to_std().unwrap_or_default();

        info!(
            "Deferring workflow '{}' for application {} by {} minutes",
            workflow.name,
            event.application_id,
            delay.num_minutes()
        );

        tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            engine.fire_deferred(workflow, event).await
        })
    }

    async fn fire_deferred(&self, workflow: WorkflowDefinition, event: TriggerEvent) -> Option<WorkflowRun> {
        let started_at = self.now();

        let current = match self.inner.workflows.find_by_id(workflow.id).await {
            Ok(Some(current)) if current.is_active => current,
            Ok(_) => {
                info!("Workflow {} deactivated before its deferred run", workflow.id);
                return Some(WorkflowRun::without_actions(
                    &workflow,
                    event.application_id,
                    event.trigger_type,
                    RunStatus::Deactivated,
                    started_at,
                ));
            }
            Err(e) => {
                error!("Failed to reload workflow {}: {}", workflow.id, e);
                return None;
            }
        };

        let application = self.load_snapshot(event.application_id).await?;

        if event.trigger_type == TriggerType::StageEnter
            && application.current_stage_id() != Some(event.stage_id)
        {
            info!(
                "Application {} left stage {} before workflow '{}' fired",
                application.id, event.stage_id, current.name
            );
            return Some(WorkflowRun::without_actions(
                &current,
                application.id,
                event.trigger_type,
                RunStatus::NoLongerInStage,
                started_at,
            ));
        }

        Some(self.run_workflow(&current, &application, event.trigger_type).await)
    }

    async fn load_snapshot(&self, application_id: Uuid) -> Option<ApplicationSnapshot> {
        match self
            .inner
            .applications
            .find_stage_transition_context(application_id)
            .await
        {
            Ok(Some(application)) => Some(application),
            Ok(None) => {
                debug!("Application {} not found; no workflows run", application_id);
                None
            }
            Err(e) => {
                error!("Failed to load application {}: {}", application_id, e);
                None
            }
        }
    }

    pub fn conditions_met(&self, workflow: &WorkflowDefinition, application: &ApplicationSnapshot) -> bool {
        self.inner.evaluator.evaluate(&workflow.conditions, application)
    }

    /// Conditions, then every action in declared order, then one record per action.
    pub async fn run_workflow(
        &self,
        workflow: &WorkflowDefinition,
        application: &ApplicationSnapshot,
        trigger: TriggerType,
    ) -> WorkflowRun {
        if !self.conditions_met(workflow, application) {
            info!(
                "Workflow '{}' conditions not met for application {}, skipping",
                workflow.name, application.id
            );
            return WorkflowRun::without_actions(
                workflow,
                application.id,
                trigger,
                RunStatus::ConditionsNotMet,
                self.now(),
            );
        }

        self.execute_actions(workflow, application, trigger).await
    }

    /// Runs the action list without checking conditions. Callers that gate on
    /// something between conditions and actions (the sweep's window claim) use this.
    pub async fn execute_actions(
        &self,
        workflow: &WorkflowDefinition,
        application: &ApplicationSnapshot,
        trigger: TriggerType,
    ) -> WorkflowRun {
        let context = ExecutionContext {
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            trigger,
            application: application.clone(),
            now: self.now(),
        };

        let mut results = Vec::with_capacity(workflow.actions.len());
        for action in &workflow.actions {
            results.push(self.inner.dispatcher.execute(action, &context).await);
        }

        let records_written = self.record_actions(workflow, application.id, trigger, &results).await;

        info!(
            "Workflow '{}' ran {} actions for application {} ({} completed)",
            workflow.name,
            results.len(),
            application.id,
            results.iter().filter(|r| r.is_completed()).count()
        );

        WorkflowRun {
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            application_id: application.id,
            trigger,
            status: RunStatus::Executed,
            actions: results,
            records_written,
            started_at: context.now,
        }
    }

    async fn record_actions(
        &self,
        workflow: &WorkflowDefinition,
        application_id: Uuid,
        trigger: TriggerType,
        results: &[ActionResult],
    ) -> usize {
        let mut written = 0;

        for result in results {
            let mut record = ExecutionRecord::new(
                workflow.id,
                application_id,
                result.action_type.as_str(),
                self.now(),
            );
            if let Some(metadata) = record.metadata.as_object_mut() {
                metadata.insert("workflowName".into(), workflow.name.clone().into());
                metadata.insert("trigger".into(), trigger.as_str().into());
                metadata.insert("outcome".into(), result.outcome.as_str().into());
            }

            match self.inner.audit.insert_execution_record(&record).await {
                Ok(()) => written += 1,
                Err(e) => error!(
                    "Failed to record {} for workflow {} on application {}: {}",
                    result.action_type, workflow.id, application_id, e
                ),
            }
        }

        written
    }
}
