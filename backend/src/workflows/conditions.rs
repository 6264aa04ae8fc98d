// Workflow Conditions - Conjunctive key/value checks against an application snapshot

use recruit_shared::{ApplicationSnapshot, ApplicationStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::definition::{Conditions, DELAY_HOURS_KEY};

/// What to do with a condition key the evaluator does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionPolicy {
    /// Unknown keys are ignored.
    #[default]
    Permissive,
    /// Unknown keys fail the whole evaluation.
    Strict,
}

impl ConditionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permissive" | "ignore" => Some(Self::Permissive),
            "strict" | "reject" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// Keys understood by the evaluator
pub mod keys {
    /// `candidate.source`, exact and case-sensitive
    pub const SOURCE: &str = "source";
    /// application status name
    pub const STATUS: &str = "status";
    /// candidate carries this tag
    pub const TAG: &str = "tag";
    /// candidate lists this skill
    pub const SKILL: &str = "skill";
    /// job id
    pub const JOB_ID: &str = "jobId";
    /// tenant owning the job
    pub const TENANT_ID: &str = "tenantId";
    /// `true` when someone is assigned to the application
    pub const ASSIGNED: &str = "assigned";

    pub const ALL: [&str; 7] = [SOURCE, STATUS, TAG, SKILL, JOB_ID, TENANT_ID, ASSIGNED];
}

/// Pure evaluator: no I/O, no mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    policy: ConditionPolicy,
}

impl ConditionEvaluator {
    pub fn new(policy: ConditionPolicy) -> Self {
        Self { policy }
    }

    /// AND across all keys. An empty mapping always matches.
    pub fn evaluate(&self, conditions: &Conditions, application: &ApplicationSnapshot) -> bool {
        for (key, expected) in conditions {
            if key == DELAY_HOURS_KEY || is_unset(expected) {
                continue;
            }

            match check(key, expected, application) {
                Some(true) => {}
                Some(false) => {
                    debug!(
                        "Condition '{}' not met for application {}",
                        key, application.id
                    );
                    return false;
                }
                None => match self.policy {
                    ConditionPolicy::Permissive => {
                        debug!("Ignoring unknown condition key '{}'", key);
                    }
                    ConditionPolicy::Strict => {
                        warn!("Rejecting workflow conditions with unknown key '{}'", key);
                        return false;
                    }
                },
            }
        }

        true
    }

    /// Whether `key` can be evaluated by this build.
    pub fn is_known_key(key: &str) -> bool {
        key == DELAY_HOURS_KEY || keys::ALL.contains(&key)
    }
}

fn is_unset(expected: &Value) -> bool {
    match expected {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// `None` means the key is unknown.
fn check(key: &str, expected: &Value, application: &ApplicationSnapshot) -> Option<bool> {
    let candidate = &application.candidate;

    let matched = match key {
        keys::SOURCE => expected
            .as_str()
            .is_some_and(|source| candidate.source.as_deref() == Some(source)),
        keys::STATUS => expected
            .as_str()
            .and_then(ApplicationStatus::parse)
            .is_some_and(|status| status == application.status),
        keys::TAG => expected
            .as_str()
            .is_some_and(|tag| candidate.tags.iter().any(|t| t == tag)),
        keys::SKILL => expected
            .as_str()
            .is_some_and(|skill| candidate.skills.iter().any(|s| s == skill)),
        keys::JOB_ID => as_uuid(expected).is_some_and(|id| id == application.job.id),
        keys::TENANT_ID => as_uuid(expected).is_some_and(|id| id == application.job.tenant_id),
        keys::ASSIGNED => expected
            .as_bool()
            .is_some_and(|assigned| assigned == application.assigned_to_id.is_some()),
        _ => return None,
    };

    Some(matched)
}

fn as_uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}
