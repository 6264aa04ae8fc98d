// Idempotency Guard - At most one TIME_IN_STAGE execution per workflow, application and window

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::collaborators::AuditRepository;
use crate::error::RepositoryError;

/// Start of the delay-sized window `now` falls in, counted from `updated_at`.
///
/// Windows are `[updated_at + k*delay, updated_at + (k+1)*delay)`; the first
/// eligible window is `k = 1`. Returns `None` while `now` is still inside `k = 0`.
pub fn execution_window_start(
    updated_at: DateTime<Utc>,
    delay: Duration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let delay_ms = delay.num_milliseconds();
    if delay_ms <= 0 {
        return None;
    }

    let elapsed_ms = (now - updated_at).num_milliseconds();
    let k = elapsed_ms.div_euclid(delay_ms);
    (k >= 1).then(|| updated_at + Duration::milliseconds(k * delay_ms))
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    audit: Arc<dyn AuditRepository>,
}

impl IdempotencyGuard {
    pub fn new(audit: Arc<dyn AuditRepository>) -> Self {
        Self { audit }
    }

    /// Any execution record for the pair at or after `since`.
    pub async fn already_executed(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.audit
            .exists_execution_record(workflow_id, application_id, since)
            .await
    }

    /// Claims the window atomically. Of two overlapping sweeps, only one gets `true`.
    pub async fn claim_window(
        &self,
        workflow_id: Uuid,
        application_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.audit
            .claim_execution_window(workflow_id, application_id, window_start)
            .await
    }
}
