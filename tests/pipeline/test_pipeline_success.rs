//! Pipeline runs that finish without error.

use crat_lib::models::{RunStatus, StepName, StepStatus, TestParameters};
use serde_json::json;

use super::mock_services::{MockState, listing};
use super::test_helpers::*;

/// Full run: download, dispatch, monitor, success notification.
#[actix_rt::test]
async fn test_run_completes_with_report_url() {
    let env = setup(MockState::default()).await;

    let run = env.trigger().await;
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.triggered_by, TEST_USER);
    assert!(run.steps.is_empty());

    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Completed, "run: {:?}", run);
    assert_eq!(run.task_id.as_deref(), Some("task-1"));
    assert_eq!(run.report_url.as_deref(), Some("http://reports.local/cds/1"));
    assert!(run.finished_at.is_some());
    assert!(run.error_message.is_none());
    assert!(
        run.response_raw_data
            .as_deref()
            .is_some_and(|raw| raw.contains("completed"))
    );

    let download_url = run.download_url.clone().unwrap();
    assert_eq!(
        download_url,
        format!("{}core/12/cds-1.4.0-release.tar.gz", env.mock.packages_url())
    );
    let download_path = run.download_path.clone().unwrap();
    assert!(download_path.starts_with(env.download_dir.path().to_str().unwrap()));
    assert_eq!(std::fs::read(&download_path).unwrap(), b"package-bytes");

    for name in [StepName::Download, StepName::Test, StepName::Monitor] {
        let step = run.step(name).unwrap_or_else(|| panic!("missing step {:?}", name));
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.end_time.is_some());
    }
    assert_eq!(
        run.step(StepName::Test).unwrap().details.as_deref(),
        Some("Test triggered, task_id: task-1")
    );
    assert_eq!(
        run.step(StepName::Monitor).unwrap().details.as_deref(),
        Some("Test completed, report URL: http://reports.local/cds/1")
    );

    let successes = env.notifier.successes.lock().unwrap().clone();
    assert_eq!(successes.len(), 1);
    let (notice, report_url) = &successes[0];
    assert_eq!(notice.recipient, TEST_USER);
    assert_eq!(notice.test_name, "cds");
    assert_eq!(notice.build_label, "core #12");
    assert_eq!(notice.build_url.as_deref(), Some("http://ci.local/job/core/12"));
    assert_eq!(report_url.as_deref(), Some("http://reports.local/cds/1"));
    assert_eq!(env.notifier.failure_count(), 0);
}

/// The dispatch body carries the resolved parameters and the local path.
#[actix_rt::test]
async fn test_dispatch_body_uses_resolved_parameters() {
    let env = setup(MockState::default()).await;
    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    let dispatched = env.mock.dispatched();
    assert_eq!(dispatched.len(), 1);
    let body = &dispatched[0];
    assert_eq!(body["service_name"], "cds");
    assert_eq!(body["report_keyword"], "cds");
    assert_eq!(body["upgrade_type"], "full");
    assert_eq!(body["install_dir"], "/opt/cds");
    assert_eq!(body["base_url"], "http://cds.test.local");
    assert_eq!(body["package_path"], json!(run.download_path.unwrap()));

    assert!(env.mock.polled_tasks().iter().all(|id| id == "task-1"));
    assert!(env.mock.polled_tasks().len() >= 2);
}

/// Deploy-only runs end in DEPLOY_COMPLETE and nobody is notified.
#[actix_rt::test]
async fn test_deploy_only_run_skips_notification() {
    let parameters = TestParameters {
        test_path: "deploy".to_string(),
        ..Default::default()
    };
    let mock_state = MockState {
        polls: [json!({ "status": "completed", "result": {} })].into(),
        ..Default::default()
    };
    let env = setup_with_parameters(mock_state, parameters).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::DeployComplete);
    assert!(run.report_url.is_none());
    assert!(run.step(StepName::Notify).is_none());
    assert_eq!(env.notifier.success_count(), 0);
    assert_eq!(env.notifier.failure_count(), 0);
}

/// Without a release build the first matching package is taken.
#[actix_rt::test]
async fn test_first_match_without_release_package() {
    let mock_state = MockState {
        listing: listing(&["other-2.0.tar.gz", "cds-1.4.0.tar.gz", "cds-1.4.1.tar.gz"]),
        ..Default::default()
    };
    let env = setup(mock_state).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.download_url.unwrap().ends_with("/cds-1.4.0.tar.gz"));
}

/// A disabled item still completes but records that no notice went out.
#[actix_rt::test]
async fn test_notification_disabled_for_item() {
    let env = setup(MockState::default()).await;
    let mut item = env.item.clone();
    item.notification_enabled = false;
    env.store.insert_test_item(item).unwrap();

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Completed);
    let notify = run.step(StepName::Notify).expect("notify step recorded");
    assert_eq!(notify.status, StepStatus::Completed);
    assert_eq!(env.notifier.success_count(), 0);
}
