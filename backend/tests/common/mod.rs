// Common test utilities shared across integration tests
use async_trait::async_trait;
use recruit_backend::workflows::collaborators::RepoResult;
use recruit_backend::workflows::{TriggerType, WorkflowDefinition, WorkflowRepository};
use std::sync::{Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// Vec-backed workflow storage for exercising the public store API.
#[derive(Default)]
pub struct VecWorkflows(pub Mutex<Vec<WorkflowDefinition>>);

#[async_trait]
impl WorkflowRepository for VecWorkflows {
    async fn find_active_by_stage_and_trigger(
        &self,
        stage_id: Uuid,
        trigger: TriggerType,
    ) -> RepoResult<Vec<WorkflowDefinition>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.is_active && w.stage_id == stage_id && w.trigger == trigger)
            .cloned()
            .collect())
    }

    async fn find_active_by_trigger(&self, trigger: TriggerType) -> RepoResult<Vec<WorkflowDefinition>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.is_active && w.trigger == trigger)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<WorkflowDefinition>> {
        Ok(self.0.lock().unwrap().iter().find(|w| w.id == id).cloned())
    }

    async fn find_by_stage(&self, stage_id: Uuid) -> RepoResult<Vec<WorkflowDefinition>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.stage_id == stage_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        self.0.lock().unwrap().push(workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &WorkflowDefinition) -> RepoResult<()> {
        let mut workflows = self.0.lock().unwrap();
        if let Some(existing) = workflows.iter_mut().find(|w| w.id == workflow.id) {
            *existing = workflow.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut workflows = self.0.lock().unwrap();
        let before = workflows.len();
        workflows.retain(|w| w.id != id);
        Ok(workflows.len() < before)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<()> {
        if let Some(existing) = self.0.lock().unwrap().iter_mut().find(|w| w.id == id) {
            existing.is_active = is_active;
        }
        Ok(())
    }
}
