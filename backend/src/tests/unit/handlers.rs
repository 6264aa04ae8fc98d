use chrono::Duration;
use recruit_shared::ApplicationStatus;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EmailError;
use crate::tests::fixtures::{ApplicationFixture, TestHarness};
use crate::tests::helpers::init_test_logging;
use crate::workflows::actions::{CreateTaskConfig, RequestFeedbackConfig};
use crate::workflows::collaborators::MockMailer;
use crate::workflows::handlers::DEFAULT_EMAIL_SUBJECT;
use crate::workflows::{
    ActionDescriptor, ActionDispatcher, ActionOutcome, ActionServices, ActionType, AssigneeType,
    EmailRecipient, UserTarget,
};

fn dispatcher(harness: &TestHarness) -> ActionDispatcher {
    ActionDispatcher::with_defaults(harness.services())
}

#[test]
fn every_action_type_has_a_default_handler() {
    let harness = TestHarness::default();
    let dispatcher = dispatcher(&harness);
    for action_type in ActionType::ALL {
        assert!(dispatcher.handles(action_type), "{} has no handler", action_type);
    }
}

// ============================================
// SEND_EMAIL
// ============================================

#[tokio::test]
async fn send_email_renders_templates_for_candidate() {
    init_test_logging();
    let harness = TestHarness::default();
    let app = ApplicationFixture::default()
        .candidate_name("Grace", "Hopper")
        .candidate_email("grace@example.com")
        .job_title("Compiler Engineer")
        .build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::send_email(
        EmailRecipient::Candidate,
        None,
        "Hi {{candidate_name}}, thanks for applying to {{job_title}}.",
    );
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "grace@example.com");
    assert_eq!(sent[0].subject, DEFAULT_EMAIL_SUBJECT);
    assert_eq!(sent[0].html, "Hi Grace Hopper, thanks for applying to Compiler Engineer.");
    assert!(!sent[0].html.contains("{{"));
}

#[tokio::test]
async fn send_email_to_hiring_manager_resolves_through_directory() {
    let harness = TestHarness::default();
    let manager = harness.users.add("Linus", "linus@example.com");
    let app = ApplicationFixture::default()
        .job_title("Kernel Engineer")
        .hiring_manager(manager)
        .build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::send_email(
        EmailRecipient::HiringManager,
        Some("New candidate for {{job_title}}"),
        "Please review.",
    );
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let sent = harness.mailer.sent();
    assert_eq!(sent[0].to, "linus@example.com");
    assert_eq!(sent[0].subject, "New candidate for Kernel Engineer");
}

#[tokio::test]
async fn send_email_without_hiring_manager_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::send_email(EmailRecipient::HiringManager, None, "Body");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn send_email_with_blank_candidate_address_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().candidate_email("  ").build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::send_email(EmailRecipient::Candidate, None, "Body");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
}

#[tokio::test]
async fn transport_failure_fails_the_action() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let mut mailer = MockMailer::new();
    mailer
        .expect_send()
        .times(1)
        .returning(|_| Err(EmailError::Unavailable("smtp down".to_string())));

    let services = ActionServices::new(
        harness.applications.clone(),
        harness.users.clone(),
        Arc::new(mailer),
    );
    let action = ActionDescriptor::send_email(EmailRecipient::Candidate, None, "Body");
    let result = ActionDispatcher::with_defaults(services)
        .execute(&action, &harness.context(&app))
        .await;

    assert_eq!(result.outcome, ActionOutcome::Failed);
    assert!(result.error.unwrap().contains("smtp down"));
}

// ============================================
// ADD_TAG
// ============================================

#[tokio::test]
async fn add_tag_is_idempotent() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().tags(&["python"]).build();
    harness.applications.insert(app.clone());
    let dispatcher = dispatcher(&harness);
    let ctx = harness.context(&app);

    let existing = dispatcher.execute(&ActionDescriptor::add_tag("python"), &ctx).await;
    assert_eq!(existing.outcome, ActionOutcome::Completed);
    assert_eq!(existing.output.unwrap()["added"], json!(false));
    assert_eq!(harness.applications.tag_writes(), 0);

    let first = dispatcher.execute(&ActionDescriptor::add_tag("referral"), &ctx).await;
    let second = dispatcher.execute(&ActionDescriptor::add_tag("referral"), &ctx).await;
    assert_eq!(first.output.unwrap()["added"], json!(true));
    assert_eq!(second.output.unwrap()["added"], json!(false));

    let stored = harness.applications.get(app.id).unwrap();
    assert_eq!(stored.candidate.tags, vec!["python".to_string(), "referral".to_string()]);
    assert_eq!(harness.applications.tag_writes(), 1);
}

#[tokio::test]
async fn blank_tag_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let result = dispatcher(&harness)
        .execute(&ActionDescriptor::add_tag("   "), &harness.context(&app))
        .await;
    assert_eq!(result.outcome, ActionOutcome::Skipped);
}

// ============================================
// CREATE_TASK
// ============================================

#[tokio::test]
async fn create_task_for_recruiter_notifies_assignee() {
    let harness = TestHarness::default();
    let recruiter = harness.users.add("Rita", "rita@example.com");
    let app = ApplicationFixture::default()
        .candidate_name("Alan", "Turing")
        .recruiter(recruiter)
        .build();
    harness.applications.insert(app.clone());

    let ctx = harness.context(&app);
    let action = ActionDescriptor::create_task(AssigneeType::Recruiter, "Call {{candidate_name}}");
    let result = dispatcher(&harness).execute(&action, &ctx).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let tasks = harness.applications.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].assignee_id, recruiter);
    assert_eq!(tasks[0].title, "Call Alan Turing");
    assert_eq!(tasks[0].due_at, ctx.now + Duration::days(3));

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Task: Call Alan Turing");
}

#[tokio::test]
async fn create_task_survives_notification_failure() {
    let harness = TestHarness::default();
    let recruiter = harness.users.add("Rita", "rita@example.com");
    harness.mailer.fail_for("rita@example.com");
    let app = ApplicationFixture::default().recruiter(recruiter).build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::CreateTask(CreateTaskConfig {
        assignee_type: Some(AssigneeType::Recruiter),
        due_in_days: Some(7),
        ..CreateTaskConfig::default()
    });
    let ctx = harness.context(&app);
    let result = dispatcher(&harness).execute(&action, &ctx).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let tasks = harness.applications.tasks();
    assert_eq!(tasks[0].title, "Follow up on application");
    assert_eq!(tasks[0].due_at, ctx.now + Duration::days(7));
}

#[tokio::test]
async fn create_task_without_assignee_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::create_task(AssigneeType::AssignedTo, "Review");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
    assert!(harness.applications.tasks().is_empty());
}

// ============================================
// REQUEST_FEEDBACK
// ============================================

#[tokio::test]
async fn request_feedback_falls_back_to_recent_interviewers() {
    let harness = TestHarness::default();
    let pending = harness.users.add("Ada", "ada@example.com");
    let done = harness.users.add("Edsger", "edsger@example.com");
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());
    harness.applications.set_interviewers(app.id, vec![pending, done]);
    harness.applications.mark_feedback_submitted(app.id, done);

    let ctx = harness.context(&app);
    let result = dispatcher(&harness)
        .execute(&ActionDescriptor::request_feedback(Vec::new()), &ctx)
        .await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let output = result.output.unwrap();
    assert_eq!(output["requested"], json!([pending]));
    assert_eq!(output["alreadySubmitted"], json!(1));

    let requests = harness.applications.feedback_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].reviewer_id, pending);
    assert_eq!(requests[0].due_at, ctx.now + Duration::days(2));

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
}

#[tokio::test]
async fn request_feedback_uses_configured_interviewers() {
    let harness = TestHarness::default();
    let reviewer = harness.users.add("Barbara", "barbara@example.com");
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());
    harness.applications.set_interviewers(app.id, vec![Uuid::new_v4()]);

    let action = ActionDescriptor::RequestFeedback(RequestFeedbackConfig {
        interviewer_ids: vec![reviewer],
        message: Some("Thoughts on {{job_title}}?".to_string()),
        due_in_days: Some(1),
    });
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    assert_eq!(harness.applications.feedback_requests()[0].reviewer_id, reviewer);
    assert!(harness.mailer.sent()[0].html.contains("Thoughts on Backend Engineer?"));
}

#[tokio::test]
async fn request_feedback_without_interviewers_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let result = dispatcher(&harness)
        .execute(&ActionDescriptor::request_feedback(Vec::new()), &harness.context(&app))
        .await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
    assert!(harness.applications.feedback_requests().is_empty());
}

// ============================================
// MOVE_STAGE / UPDATE_STATUS
// ============================================

#[tokio::test]
async fn move_stage_writes_target_stage() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());
    let target = Uuid::new_v4();

    let result = dispatcher(&harness)
        .execute(&ActionDescriptor::move_stage(target), &harness.context(&app))
        .await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    assert_eq!(harness.applications.get(app.id).unwrap().current_stage_id(), Some(target));
}

#[tokio::test]
async fn move_stage_storage_error_fails() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());
    harness.applications.fail_stage_updates();

    let result = dispatcher(&harness)
        .execute(&ActionDescriptor::move_stage(Uuid::new_v4()), &harness.context(&app))
        .await;

    assert_eq!(result.outcome, ActionOutcome::Failed);
}

#[tokio::test]
async fn update_status_writes_status() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let result = dispatcher(&harness)
        .execute(
            &ActionDescriptor::update_status(ApplicationStatus::Offer),
            &harness.context(&app),
        )
        .await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    assert_eq!(harness.applications.get(app.id).unwrap().status, ApplicationStatus::Offer);
}

#[tokio::test]
async fn missing_configuration_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let action: ActionDescriptor =
        serde_json::from_value(json!({ "type": "UPDATE_STATUS", "config": {} })).unwrap();
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
    assert_eq!(harness.applications.get(app.id).unwrap().status, app.status);
}

// ============================================
// NOTIFY_USER
// ============================================

#[tokio::test]
async fn notify_recruiter_sends_action_required_email() {
    let harness = TestHarness::default();
    let recruiter = harness.users.add("Rita", "rita@example.com");
    let app = ApplicationFixture::default()
        .job_title("Data Engineer")
        .candidate_name("Katherine", "Johnson")
        .recruiter(recruiter)
        .build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::notify_user(UserTarget::Recruiter, "{{candidate_name}} is waiting");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Completed);
    let sent = harness.mailer.sent();
    assert_eq!(sent[0].to, "rita@example.com");
    assert_eq!(sent[0].subject, "Action Required: Data Engineer");
    assert_eq!(sent[0].html, "Katherine Johnson is waiting");
}

#[tokio::test]
async fn notify_unassigned_application_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::notify_user(UserTarget::AssignedTo, "Ping");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn notify_unknown_user_is_skipped() {
    let harness = TestHarness::default();
    let app = ApplicationFixture::default().build();
    harness.applications.insert(app.clone());

    let action = ActionDescriptor::notify_user(UserTarget::User(Uuid::new_v4()), "Ping");
    let result = dispatcher(&harness).execute(&action, &harness.context(&app)).await;

    assert_eq!(result.outcome, ActionOutcome::Skipped);
}
