// Job Scheduler - Cron registration for the automation sweep

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::time_in_stage::{JOB_NAME, SweepReport, TimeInStageJob};

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Six-field cron expression (seconds first).
    pub time_in_stage_cron: String,
    pub enabled: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Top of every hour
            time_in_stage_cron: "0 0 * * * *".to_string(),
            enabled: true,
        }
    }
}

/// One finished sweep, as kept in the in-memory run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub applications_considered: i32,
    pub workflows_executed: i32,
    pub errors: Vec<String>,
}

impl JobExecutionLog {
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    /// Some workflows or applications errored; the rest of the sweep still ran.
    PartialFailure,
    Failed,
}

type ExecutionLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    time_in_stage: Arc<TimeInStageJob>,
    config: JobConfig,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new(time_in_stage: TimeInStageJob, config: JobConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            time_in_stage: Arc::new(time_in_stage),
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        if !self.config.enabled {
            info!("Workflow automation is disabled, not scheduling the time-in-stage sweep");
            return Ok(());
        }

        info!("Starting automation job scheduler");

        self.schedule_time_in_stage().await?;
        self.scheduler.start().await?;

        info!("Automation job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down automation job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_time_in_stage(&self) -> JobResult<()> {
        let cron_expr = self.config.time_in_stage_cron.clone();
        let sweep = self.time_in_stage.clone();
        let logs = self.execution_logs.clone();

        // Overlapping ticks are allowed; the window claim keeps them from double-firing.
        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let sweep = sweep.clone();
            let logs = logs.clone();

            Box::pin(async move {
                info!("Running time-in-stage sweep");
                run_logged(&sweep, &logs).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled time-in-stage sweep on '{}'", cron_expr);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Runs a job immediately, outside the cron schedule.
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<SweepReport> {
        match job_name {
            JOB_NAME => Ok(run_logged(&self.time_in_stage, &self.execution_logs).await),
            _ => Err(JobError::UnknownJob(job_name.to_string())),
        }
    }
}

async fn run_logged(sweep: &TimeInStageJob, logs: &ExecutionLogs) -> SweepReport {
    let started_at = Utc::now();
    let report = sweep.run().await;
    let completed_at = Utc::now();

    let status = if report.errors.is_empty() {
        JobStatus::Completed
    } else if report.executed > 0 || report.already_executed > 0 {
        JobStatus::PartialFailure
    } else {
        JobStatus::Failed
    };

    if status != JobStatus::Completed {
        error!(
            "Time-in-stage sweep finished with {} errors",
            report.errors.len()
        );
    }

    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: JOB_NAME.to_string(),
        started_at,
        completed_at,
        status,
        applications_considered: report.applications_considered,
        workflows_executed: report.executed,
        errors: report.errors.clone(),
    };

    push_log(logs, log).await;
    report
}

async fn push_log(logs: &ExecutionLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        let excess = logs.len() - MAX_EXECUTION_LOGS;
        logs.drain(..excess);
    }
}
