use sqlx::{PgPool, Postgres, migrate::MigrateDatabase, postgres::PgPoolOptions};
use std::time::Duration;

/// Connection limits for the automation pool. Overridable through `DB_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        // One sweep plus the stage-transition hooks never need many connections
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_connections: env_u64("DB_MAX_CONNECTIONS")
                .map_or(defaults.max_connections, |n| n as u32),
            min_connections: env_u64("DB_MIN_CONNECTIONS")
                .map_or(defaults.min_connections, |n| n as u32),
            acquire_timeout: env_u64("DB_ACQUIRE_TIMEOUT")
                .map_or(defaults.acquire_timeout, Duration::from_secs),
            idle_timeout: env_u64("DB_IDLE_TIMEOUT")
                .map_or(defaults.idle_timeout, Duration::from_secs),
        }
    }
}

fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::from_env()).await
}

/// Connects to the automation database, creating it first when it does not exist.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> anyhow::Result<PgPool> {
    if !Postgres::database_exists(database_url).await? {
        tracing::warn!("Automation database missing, creating it");
        Postgres::create_database(database_url).await?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    tracing::info!(
        "Connected automation pool ({}..={} connections)",
        config.min_connections,
        config.max_connections
    );

    Ok(pool)
}

/// Applies the workflow automation tables from `./migrations`.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Workflow automation schema is up to date");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}
