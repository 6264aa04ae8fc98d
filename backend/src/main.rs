use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recruit_backend::clock::SystemClock;
use recruit_backend::config::Config;
use recruit_backend::database;
use recruit_backend::jobs::{JobScheduler, TimeInStageJob};
use recruit_backend::services::{
    EmailService, PgApplicationRepository, PgAuditRepository, PgUserDirectory, PgWorkflowRepository,
};
use recruit_backend::workflows::{EngineCollaborators, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.automation.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = database::create_pool(&config.database_url).await?;
    database::migrate(&db_pool).await?;

    if !database::health_check(&db_pool).await {
        anyhow::bail!("Database health check failed");
    }

    let collaborators = EngineCollaborators {
        workflows: Arc::new(PgWorkflowRepository::new(db_pool.clone())),
        applications: Arc::new(PgApplicationRepository::new(db_pool.clone())),
        audit: Arc::new(PgAuditRepository::new(db_pool.clone())),
        users: Arc::new(PgUserDirectory::new(db_pool.clone())),
        mailer: Arc::new(EmailService::new(&config.smtp)?),
        clock: Arc::new(SystemClock),
    };

    let engine = WorkflowEngine::new(collaborators.clone(), config.automation.condition_policy);
    let sweep = TimeInStageJob::new(
        engine,
        &collaborators,
        config.automation.default_delay_hours,
    );

    let mut scheduler = JobScheduler::new(sweep, config.automation.job_config()).await?;
    scheduler.start().await?;

    tracing::info!(
        "Workflow automation running (policy: {:?}, default delay: {}h)",
        config.automation.condition_policy,
        config.automation.default_delay_hours
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await?;
    db_pool.close().await;

    Ok(())
}
