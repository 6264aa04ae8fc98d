// Background Jobs
//
// Scheduled automation jobs. The time-in-stage sweep runs on tokio-cron-scheduler
// and can also be ticked on demand through `JobScheduler::run_job_now`.

pub mod scheduler;
pub mod time_in_stage;

pub use scheduler::{JobConfig, JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
pub use time_in_stage::{SweepReport, TimeInStageJob};
