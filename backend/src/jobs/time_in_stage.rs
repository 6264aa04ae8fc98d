// Time-In-Stage Job - Hourly sweep firing TIME_IN_STAGE workflows once per window

use chrono::{DateTime, Utc};
use recruit_shared::{ApplicationSnapshot, ApplicationStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::RepositoryError;
use crate::workflows::{
    ApplicationRepository, EngineCollaborators, IdempotencyGuard, TriggerType, WorkflowDefinition,
    WorkflowEngine, WorkflowRepository, execution_window_start,
};

pub const JOB_NAME: &str = "time_in_stage";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: Option<DateTime<Utc>>,
    pub workflows_scanned: i32,
    pub applications_considered: i32,
    pub executed: i32,
    pub already_executed: i32,
    pub conditions_not_met: i32,
    pub actions_run: i32,
    pub errors: Vec<String>,
}

enum SweepOutcome {
    Executed { actions: usize },
    AlreadyExecuted,
    ConditionsNotMet,
    NotYetDue,
}

pub struct TimeInStageJob {
    engine: WorkflowEngine,
    workflows: Arc<dyn WorkflowRepository>,
    applications: Arc<dyn ApplicationRepository>,
    guard: IdempotencyGuard,
    clock: Arc<dyn Clock>,
    default_delay_hours: i64,
}

impl TimeInStageJob {
    pub fn new(
        engine: WorkflowEngine,
        collaborators: &EngineCollaborators,
        default_delay_hours: i64,
    ) -> Self {
        Self {
            engine,
            workflows: collaborators.workflows.clone(),
            applications: collaborators.applications.clone(),
            guard: IdempotencyGuard::new(collaborators.audit.clone()),
            clock: collaborators.clock.clone(),
            default_delay_hours,
        }
    }

    /// One sweep over every active `TIME_IN_STAGE` workflow. Never fails as a
    /// whole: a bad workflow or application is logged and counted, then skipped.
    pub async fn run(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport {
            started_at: Some(now),
            ..SweepReport::default()
        };

        let workflows = match self
            .workflows
            .find_active_by_trigger(TriggerType::TimeInStage)
            .await
        {
            Ok(workflows) => workflows,
            Err(e) => {
                error!("Failed to load time-in-stage workflows: {}", e);
                report.errors.push(format!("load workflows: {}", e));
                return report;
            }
        };

        info!("Time-in-stage sweep: checking {} workflows", workflows.len());

        for workflow in workflows.iter().filter(|w| w.is_active) {
            report.workflows_scanned += 1;
            self.sweep_workflow(workflow, now, &mut report).await;
        }

        info!(
            "Time-in-stage sweep completed: {} applications considered, {} executed, {} already executed",
            report.applications_considered, report.executed, report.already_executed
        );

        report
    }

    async fn sweep_workflow(
        &self,
        workflow: &WorkflowDefinition,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let delay = workflow.time_in_stage_delay(self.default_delay_hours);
        let Some(cutoff) = now.checked_sub_signed(delay) else {
            error!(
                "Workflow {} delay of {} minutes reaches before the supported time range",
                workflow.id,
                delay.num_minutes()
            );
            report
                .errors
                .push(format!("workflow {}: delay out of range", workflow.id));
            return;
        };

        let applications = match self
            .applications
            .find_applications_in_stage(workflow.stage_id, cutoff, &ApplicationStatus::TERMINAL)
            .await
        {
            Ok(applications) => applications,
            Err(e) => {
                error!(
                    "Failed to load applications for workflow {} on stage {}: {}",
                    workflow.id, workflow.stage_id, e
                );
                report.errors.push(format!("workflow {}: {}", workflow.id, e));
                return;
            }
        };

        debug!(
            "Workflow '{}': {} applications in stage since before {}",
            workflow.name,
            applications.len(),
            cutoff
        );

        for application in &applications {
            report.applications_considered += 1;

            match self
                .process_application(workflow, application, delay, cutoff, now)
                .await
            {
                Ok(SweepOutcome::Executed { actions }) => {
                    report.executed += 1;
                    report.actions_run += actions as i32;
                }
                Ok(SweepOutcome::AlreadyExecuted) => report.already_executed += 1,
                Ok(SweepOutcome::ConditionsNotMet) => report.conditions_not_met += 1,
                Ok(SweepOutcome::NotYetDue) => {}
                Err(e) => {
                    error!(
                        "Workflow {} failed for application {}: {}",
                        workflow.id, application.id, e
                    );
                    report
                        .errors
                        .push(format!("workflow {} application {}: {}", workflow.id, application.id, e));
                }
            }
        }
    }

    async fn process_application(
        &self,
        workflow: &WorkflowDefinition,
        application: &ApplicationSnapshot,
        delay: chrono::Duration,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, RepositoryError> {
        if application.status.is_terminal()
            || application.current_stage_id() != Some(workflow.stage_id)
            || application.updated_at > cutoff
        {
            return Ok(SweepOutcome::NotYetDue);
        }

        let Some(window_start) = execution_window_start(application.updated_at, delay, now) else {
            return Ok(SweepOutcome::NotYetDue);
        };

        if self
            .guard
            .already_executed(workflow.id, application.id, cutoff)
            .await?
        {
            debug!(
                "Workflow {} already executed for application {} since {}",
                workflow.id, application.id, cutoff
            );
            return Ok(SweepOutcome::AlreadyExecuted);
        }

        if !self.engine.conditions_met(workflow, application) {
            return Ok(SweepOutcome::ConditionsNotMet);
        }

        if !self
            .guard
            .claim_window(workflow.id, application.id, window_start)
            .await?
        {
            debug!(
                "Window {} for workflow {} and application {} claimed by another sweep",
                window_start, workflow.id, application.id
            );
            return Ok(SweepOutcome::AlreadyExecuted);
        }

        let run = self
            .engine
            .execute_actions(workflow, application, TriggerType::TimeInStage)
            .await;

        Ok(SweepOutcome::Executed {
            actions: run.actions.len(),
        })
    }
}
