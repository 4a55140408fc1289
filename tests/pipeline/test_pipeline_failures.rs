//! Pipeline runs that end in FAILED.

use std::sync::Arc;

use async_trait::async_trait;
use crat_lib::models::{RunStatus, StepName, StepStatus, setting_keys};
use crat_lib::services::HttpGateway;
use crat_lib::services::gateway::{GatewayError, GatewayRequest, GatewayResponse};
use serde_json::json;

use super::mock_services::{MockState, listing};
use super::test_helpers::*;

/// Content-Length 0 fails the download stage.
#[actix_rt::test]
async fn test_empty_package_fails_download() {
    let mock_state = MockState {
        package: Vec::new(),
        ..Default::default()
    };
    let env = setup(mock_state).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.clone().unwrap();
    assert!(message.starts_with("Download failed: "), "{}", message);
    assert!(message.contains("empty"), "{}", message);

    let download = run.step(StepName::Download).unwrap();
    assert_eq!(download.status, StepStatus::Failed);
    assert!(download.error.is_some());
    assert!(run.step(StepName::Test).is_none());
    assert!(env.mock.dispatched().is_empty());

    let failures = env.notifier.failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, message);
}

/// No package in the listing matches the test item name.
#[actix_rt::test]
async fn test_no_matching_package() {
    let mock_state = MockState {
        listing: listing(&["../", "other-1.0.tar.gz"]),
        ..Default::default()
    };
    let env = setup(mock_state).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(
        run.error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Download failed: ")),
        "{:?}",
        run.error_message
    );
    assert!(run.download_path.is_none());
}

/// A dispatch response without task_id fails the test stage.
#[actix_rt::test]
async fn test_missing_task_id_fails_dispatch() {
    let mock_state = MockState {
        dispatch_response: json!({ "status": "queued" }),
        ..Default::default()
    };
    let env = setup(mock_state).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.error_message.as_deref(),
        Some("Trigger test failed: no task_id in response")
    );
    assert_eq!(run.step(StepName::Download).unwrap().status, StepStatus::Completed);
    assert_eq!(run.step(StepName::Test).unwrap().status, StepStatus::Failed);
    assert!(run.step(StepName::Monitor).is_none());
    assert!(env.mock.polled_tasks().is_empty());
    assert_eq!(env.notifier.failure_count(), 1);
}

/// The test service reports failure; the raw body is kept.
#[actix_rt::test]
async fn test_external_failure_fails_monitor() {
    let mock_state = MockState {
        polls: [
            json!({ "status": "running" }),
            json!({ "status": "failed", "error": "install script exited 2" }),
        ]
        .into(),
        ..Default::default()
    };
    let env = setup(mock_state).await;

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Failed);
    let message = run.error_message.clone().unwrap();
    assert!(message.starts_with("Monitor failed: "), "{}", message);
    assert!(message.contains("install script exited 2"), "{}", message);
    assert!(
        run.response_raw_data
            .as_deref()
            .is_some_and(|raw| raw.contains("install script exited 2"))
    );
    assert_eq!(run.step(StepName::Monitor).unwrap().status, StepStatus::Failed);
    assert_eq!(env.notifier.failure_count(), 1);
    assert_eq!(env.notifier.success_count(), 0);
}

/// A missing mirror setting fails the run, not the trigger.
#[actix_rt::test]
async fn test_missing_download_base_url() {
    let env = setup(MockState::default()).await;
    env.store
        .set_setting(setting_keys::PACKAGE_DOWNLOAD_BASE_URL, "")
        .unwrap();

    let run = env.trigger().await;
    assert_eq!(run.status, RunStatus::Pending);

    let run = wait_for_terminal(&env.service, run.id).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(
        run.error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Download failed: ")
                && m.contains(setting_keys::PACKAGE_DOWNLOAD_BASE_URL)),
        "{:?}",
        run.error_message
    );
}

/// Gateway that panics on the first call to the test service.
struct ExplodingGateway;

#[async_trait]
impl HttpGateway for ExplodingGateway {
    async fn send(&self, _: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        panic!("gateway exploded");
    }
}

/// A panic inside a stage fails the run and closes the step it was in.
#[actix_rt::test]
async fn test_stage_panic_fails_run_and_open_step() {
    let env = setup(MockState::default())
        .await
        .with_gateway(Arc::new(ExplodingGateway));

    let run = env.trigger().await;
    let run = wait_for_terminal(&env.service, run.id).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.error_message.as_deref(),
        Some("Unexpected fault: gateway exploded")
    );
    assert_eq!(run.step(StepName::Download).unwrap().status, StepStatus::Completed);

    let test = run.step(StepName::Test).unwrap();
    assert_eq!(test.status, StepStatus::Failed);
    assert!(test.end_time.is_some());
    assert_eq!(test.error.as_deref(), Some("gateway exploded"));
    assert!(
        run.steps
            .iter()
            .all(|step| step.status != StepStatus::Running),
        "{:?}",
        run.steps
    );
    assert!(run.step(StepName::Monitor).is_none());
}
