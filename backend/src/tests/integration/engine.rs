use serde_json::json;
use uuid::Uuid;

use crate::tests::fixtures::{ApplicationFixture, TestHarness};
use crate::tests::helpers::init_test_logging;
use crate::workflows::{
    ActionDescriptor, ActionOutcome, ApplicationRepository, ConditionPolicy, EmailRecipient,
    EventSource, RunStatus, TriggerEvent, TriggerType, WorkflowDefinition, WorkflowEngine,
    WorkflowRepository,
};

fn referral_welcome(stage_id: Uuid) -> WorkflowDefinition {
    WorkflowDefinition::new(
        "Referral welcome",
        stage_id,
        TriggerType::StageEnter,
        vec![
            ActionDescriptor::send_email(
                EmailRecipient::Candidate,
                Some("Welcome, {{candidate_first_name}}"),
                "Hi {{candidate_name}}, you are now in {{stage_name}} for {{job_title}}.",
            ),
            ActionDescriptor::add_tag("referral"),
        ],
    )
    .with_condition("source", json!("REFERRAL"))
}

#[tokio::test]
async fn enter_workflow_runs_only_for_matching_source() {
    init_test_logging();
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    let workflow_id = harness.workflows.add(referral_welcome(stage));

    let referral = harness.applications.insert(
        ApplicationFixture::default()
            .source("REFERRAL")
            .candidate_name("Grace", "Hopper")
            .job_title("Compiler Engineer")
            .stage(stage)
            .stage_name("Onsite")
            .build(),
    );
    let website = harness.applications.insert(
        ApplicationFixture::default().source("Website").stage(stage).build(),
    );

    let engine = harness.engine();
    let report = engine
        .handle_stage_transition(referral, stage, Some(Uuid::new_v4()))
        .await;
    assert_eq!(report.runs.len(), 1);
    let run = &report.runs[0];
    assert!(run.executed());
    assert_eq!(run.records_written, 2);

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome, Grace");
    assert_eq!(
        sent[0].html,
        "Hi Grace Hopper, you are now in Onsite for Compiler Engineer."
    );
    assert!(!sent[0].html.contains("{{"));
    assert!(harness
        .applications
        .get(referral)
        .unwrap()
        .candidate
        .tags
        .contains(&"referral".to_string()));

    let skipped = engine.handle_stage_transition(website, stage, None).await;
    assert_eq!(skipped.runs[0].status, RunStatus::ConditionsNotMet);
    assert!(skipped.runs[0].actions.is_empty());
    assert!(harness.audit.records_for(workflow_id, website).is_empty());
    assert_eq!(harness.mailer.sent().len(), 1);
}

#[tokio::test]
async fn inactive_workflow_never_fires() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(referral_welcome(stage).inactive());
    let app = harness.applications.insert(
        ApplicationFixture::default().source("REFERRAL").stage(stage).build(),
    );

    let report = harness.engine().handle_stage_transition(app, stage, None).await;

    assert!(report.runs.is_empty());
    assert!(report.deferred.is_empty());
    assert!(harness.audit.records().is_empty());
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn transition_fires_exit_before_enter() {
    let harness = TestHarness::default();
    let (old_stage, new_stage) = (Uuid::new_v4(), Uuid::new_v4());
    harness.workflows.add(WorkflowDefinition::new(
        "Left screening",
        old_stage,
        TriggerType::StageExit,
        vec![ActionDescriptor::add_tag("screened")],
    ));
    harness.workflows.add(WorkflowDefinition::new(
        "Entered interview",
        new_stage,
        TriggerType::StageEnter,
        vec![ActionDescriptor::add_tag("interviewing")],
    ));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(new_stage).build());

    let report = harness
        .engine()
        .handle_stage_transition(app, new_stage, Some(old_stage))
        .await;

    let triggers: Vec<TriggerType> = report.runs.iter().map(|r| r.trigger).collect();
    assert_eq!(triggers, vec![TriggerType::StageExit, TriggerType::StageEnter]);
    assert_eq!(
        harness.applications.get(app).unwrap().candidate.tags,
        vec!["screened".to_string(), "interviewing".to_string()]
    );
}

#[tokio::test]
async fn same_stage_transition_skips_exit() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(WorkflowDefinition::new(
        "Exit",
        stage,
        TriggerType::StageExit,
        vec![ActionDescriptor::add_tag("exit")],
    ));
    harness.workflows.add(WorkflowDefinition::new(
        "Enter",
        stage,
        TriggerType::StageEnter,
        vec![ActionDescriptor::add_tag("enter")],
    ));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness
        .engine()
        .handle_stage_transition(app, stage, Some(stage))
        .await;

    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].trigger, TriggerType::StageEnter);
}

#[tokio::test]
async fn failed_action_does_not_stop_later_actions() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    let workflow_id = harness.workflows.add(WorkflowDefinition::new(
        "Move then tag",
        stage,
        TriggerType::StageEnter,
        vec![
            ActionDescriptor::move_stage(Uuid::new_v4()),
            ActionDescriptor::add_tag("kept"),
        ],
    ));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());
    harness.applications.fail_stage_updates();

    let report = harness.engine().handle_stage_transition(app, stage, None).await;

    let outcomes: Vec<ActionOutcome> = report.runs[0].actions.iter().map(|a| a.outcome).collect();
    assert_eq!(outcomes, vec![ActionOutcome::Failed, ActionOutcome::Completed]);
    assert_eq!(
        harness.applications.get(app).unwrap().candidate.tags,
        vec!["kept".to_string()]
    );

    let records = harness.audit.records_for(workflow_id, app);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action_type, "MOVE_STAGE");
    assert_eq!(records[0].metadata["outcome"], json!("FAILED"));
    assert_eq!(records[1].metadata["outcome"], json!("COMPLETED"));
    assert_eq!(records[1].metadata["workflowId"], json!(workflow_id));
    assert_eq!(records[1].metadata["trigger"], json!("STAGE_ENTER"));
    assert_eq!(records[1].metadata["workflowName"], json!("Move then tag"));
}

#[tokio::test]
async fn strict_policy_rejects_unknown_condition_keys() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(
        WorkflowDefinition::new(
            "Salary band",
            stage,
            TriggerType::StageEnter,
            vec![ActionDescriptor::add_tag("band-b")],
        )
        .with_condition("salaryBand", json!("B")),
    );
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let strict = WorkflowEngine::new(harness.collaborators(), ConditionPolicy::Strict);
    let report = strict.handle_stage_transition(app, stage, None).await;
    assert_eq!(report.runs[0].status, RunStatus::ConditionsNotMet);

    let permissive = harness.engine().handle_stage_transition(app, stage, None).await;
    assert!(permissive.runs[0].executed());
}

#[tokio::test]
async fn process_event_ignores_time_in_stage() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(WorkflowDefinition::new(
        "Stale",
        stage,
        TriggerType::TimeInStage,
        vec![ActionDescriptor::add_tag("stale")],
    ));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness
        .engine()
        .process_event(&TriggerEvent::time_in_stage(app, stage))
        .await;

    assert!(report.runs.is_empty());
    assert!(harness.audit.records().is_empty());
}

#[tokio::test]
async fn process_event_runs_immediate_triggers() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(WorkflowDefinition::new(
        "Exit",
        stage,
        TriggerType::StageExit,
        vec![ActionDescriptor::add_tag("left")],
    ));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().build());

    let event = TriggerEvent::stage_exited(app, stage, EventSource::User(Uuid::new_v4()));
    let report = harness.engine().process_event(&event).await;

    assert_eq!(report.runs.len(), 1);
    assert!(report.runs[0].executed());
}

#[tokio::test]
async fn missing_application_runs_nothing() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(referral_welcome(stage));

    let report = harness
        .engine()
        .handle_stage_transition(Uuid::new_v4(), stage, None)
        .await;

    assert!(report.runs.is_empty());
}

#[tokio::test]
async fn unreachable_workflow_store_matches_nothing() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(referral_welcome(stage));
    harness.workflows.fail_reads();

    let matched = harness
        .engine()
        .matcher()
        .match_workflows(TriggerType::StageEnter, stage)
        .await;
    assert!(matched.is_empty());
}

// ============================================
// Deferred triggers
// ============================================

fn delayed_tag(stage_id: Uuid, minutes: i64) -> WorkflowDefinition {
    WorkflowDefinition::new(
        "Delayed tag",
        stage_id,
        TriggerType::StageEnter,
        vec![ActionDescriptor::add_tag("delayed")],
    )
    .with_delay_minutes(minutes)
}

#[tokio::test(start_paused = true)]
async fn delayed_workflow_fires_after_delay() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    let workflow_id = harness.workflows.add(delayed_tag(stage, 30));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness.engine().handle_stage_transition(app, stage, None).await;
    assert!(report.runs.is_empty());
    assert_eq!(report.deferred.len(), 1);
    assert!(harness.audit.records().is_empty());

    let runs = report.wait_deferred().await;
    assert_eq!(runs.len(), 1);
    assert!(runs[0].executed());
    assert_eq!(harness.audit.records_for(workflow_id, app).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn delayed_workflow_deactivated_before_firing_does_nothing() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    let workflow_id = harness.workflows.add(delayed_tag(stage, 60));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness.engine().handle_stage_transition(app, stage, None).await;
    harness.workflows.set_active(workflow_id, false).await.unwrap();

    let runs = report.wait_deferred().await;
    assert_eq!(runs[0].status, RunStatus::Deactivated);
    assert!(harness.audit.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delayed_enter_skips_when_application_moved_on() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(delayed_tag(stage, 15));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness.engine().handle_stage_transition(app, stage, None).await;
    harness.applications.update_stage(app, Uuid::new_v4()).await.unwrap();

    let runs = report.wait_deferred().await;
    assert_eq!(runs[0].status, RunStatus::NoLongerInStage);
    assert!(harness.applications.get(app).unwrap().candidate.tags.is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_stored_delay_is_deferred_not_fatal() {
    let harness = TestHarness::default();
    let stage = Uuid::new_v4();
    harness.workflows.add(delayed_tag(stage, i64::MAX));
    let app = harness
        .applications
        .insert(ApplicationFixture::default().stage(stage).build());

    let report = harness.engine().handle_stage_transition(app, stage, None).await;

    assert!(report.runs.is_empty());
    assert_eq!(report.deferred.len(), 1);
    assert!(harness.audit.records().is_empty());
}
