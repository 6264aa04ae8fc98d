// Workflow Definition - A stage-bound automation rule as read by the engine

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::actions::ActionDescriptor;
use super::triggers::TriggerType;

/// Key -> expected-value mapping checked against the application snapshot.
pub type Conditions = BTreeMap<String, serde_json::Value>;

/// Scheduling key stored alongside conditions; never matched against the application.
pub const DELAY_HOURS_KEY: &str = "delayHours";

/// Longest deferral or time-in-stage threshold a workflow may carry (one year).
pub const MAX_DELAY_MINUTES: i64 = 365 * 24 * 60;
pub const MAX_DELAY_HOURS: f64 = (MAX_DELAY_MINUTES / 60) as f64;

/// Parses `delayHours`, accepting only finite positive numbers within [`MAX_DELAY_HOURS`].
pub fn delay_hours(conditions: &Conditions) -> Option<f64> {
    conditions
        .get(DELAY_HOURS_KEY)
        .and_then(|value| value.as_f64())
        .filter(|hours| hours.is_finite() && *hours > 0.0 && *hours <= MAX_DELAY_HOURS)
}

fn bounded_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes.clamp(0, MAX_DELAY_MINUTES)).unwrap_or(Duration::zero())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stage_id: Uuid,
    pub trigger: TriggerType,
    #[serde(default)]
    pub conditions: Conditions,
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub delay_minutes: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(name: &str, stage_id: Uuid, trigger: TriggerType, actions: Vec<ActionDescriptor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            stage_id,
            trigger,
            conditions: Conditions::new(),
            actions,
            delay_minutes: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_condition(mut self, key: &str, value: serde_json::Value) -> Self {
        self.conditions.insert(key.to_string(), value);
        self
    }

    pub fn with_delay_minutes(mut self, minutes: i64) -> Self {
        self.delay_minutes = minutes;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Deferral applied to enter/exit triggers before they fire, capped at
    /// [`MAX_DELAY_MINUTES`] for rows written before the store enforced it.
    pub fn firing_delay(&self) -> Option<Duration> {
        (self.delay_minutes > 0).then(|| bounded_minutes(self.delay_minutes))
    }

    /// Threshold for `TIME_IN_STAGE`: `delayMinutes` when set, else the
    /// `delayHours` condition key, else the configured default.
    pub fn time_in_stage_delay(&self, default_hours: i64) -> Duration {
        if self.delay_minutes > 0 {
            return bounded_minutes(self.delay_minutes);
        }

        match delay_hours(&self.conditions) {
            Some(hours) => bounded_minutes((hours * 60.0).round() as i64),
            None => bounded_minutes(default_hours.saturating_mul(60)),
        }
    }
}
