//! HTTP API tests for the deploy-test routes.

use actix_web::test;
use serde_json::json;
use uuid::Uuid;

use super::mock_services::MockState;
use super::test_helpers::*;

/// Trigger answers 202 with the PENDING run.
#[actix_rt::test]
async fn test_trigger_returns_accepted_run() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;

    let req = with_user(test::TestRequest::post())
        .uri(&format!("/api/v1/test-items/{}/deploy-test", env.item.id))
        .set_json(json!({ "build_artifact_id": env.artifact.id }));
    let (status, body) = call_json(&app, req).await;

    assert_eq!(status, 202, "body: {:?}", body);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["triggered_by"], TEST_USER);
    assert_eq!(body["test_item_id"], json!(env.item.id));
    assert_eq!(body["build_artifact_id"], json!(env.artifact.id));
    assert_eq!(body["max_query_hours"], 1);

    let run_id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();
    let run = wait_for_terminal(&env.service, run_id).await;
    assert_eq!(run.status.as_str(), "COMPLETED");
}

/// Missing user header is rejected before anything is created.
#[actix_rt::test]
async fn test_trigger_without_user_is_unauthorized() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/test-items/{}/deploy-test", env.item.id))
        .set_json(json!({ "build_artifact_id": env.artifact.id }));
    let (status, body) = call_json(&app, req).await;

    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");
    assert_eq!(env.service.processing_count().await.unwrap(), 0);
}

#[actix_rt::test]
async fn test_trigger_rejects_unknown_fields() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;

    let req = with_user(test::TestRequest::post())
        .uri(&format!("/api/v1/test-items/{}/deploy-test", env.item.id))
        .set_json(json!({ "build_artifact_id": env.artifact.id, "force": true }));
    let (status, body) = call_json(&app, req).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[actix_rt::test]
async fn test_trigger_unknown_references_are_not_found() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;

    let req = with_user(test::TestRequest::post())
        .uri(&format!("/api/v1/test-items/{}/deploy-test", Uuid::now_v7()))
        .set_json(json!({ "build_artifact_id": env.artifact.id }));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 404);

    let req = with_user(test::TestRequest::post())
        .uri(&format!("/api/v1/test-items/{}/deploy-test", env.item.id))
        .set_json(json!({ "build_artifact_id": Uuid::now_v7() }));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 404);

    let req = with_user(test::TestRequest::post())
        .uri(&format!("/api/v1/test-items/{}/deploy-test", env.item.id))
        .set_json(json!({
            "build_artifact_id": env.artifact.id,
            "parameter_set_id": Uuid::now_v7()
        }));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_get_run_and_unknown_run() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;
    let run = env.trigger().await;
    wait_for_terminal(&env.service, run.id).await;

    let req = test::TestRequest::get().uri(&format!("/api/v1/deploy-test-runs/{}", run.id));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "COMPLETED");
    assert!(body["steps"].as_array().is_some_and(|steps| steps.len() >= 3));
    assert_eq!(body["steps"][0]["name"], "download");

    let req =
        test::TestRequest::get().uri(&format!("/api/v1/deploy-test-runs/{}", Uuid::now_v7()));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}

/// Listing is newest first; bad paging values fall back to defaults.
#[actix_rt::test]
async fn test_list_runs_paging() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;

    let first = env.trigger().await;
    let second = env.trigger().await;
    wait_for_terminal(&env.service, first.id).await;
    wait_for_terminal(&env.service, second.id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/test-items/{}/deploy-runs?limit=1", env.item.id));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["runs"].as_array().unwrap().len(), 1);
    assert_eq!(body["runs"][0]["id"], json!(second.id));

    let req = test::TestRequest::get().uri("/api/v1/deploy-test-runs?limit=500&offset=-3");
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["limit"], 20);
    assert_eq!(body["offset"], 0);
    assert_eq!(body["runs"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/deploy-test-runs?test_item_id={}", Uuid::now_v7()));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 0);

    let req = test::TestRequest::get().uri("/api/v1/deploy-test-runs?test_item_id=not-a-uuid");
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 400);
}

#[actix_rt::test]
async fn test_clear_history() {
    let env = setup(MockState::default()).await;
    let app = create_test_app(&env.service).await;
    let run = env.trigger().await;
    wait_for_terminal(&env.service, run.id).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/test-items/{}/deploy-history", env.item.id));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 401);

    let req = with_user(test::TestRequest::delete())
        .uri(&format!("/api/v1/test-items/{}/deploy-history", env.item.id));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["deleted_count"], 1);
    assert_eq!(body["test_item_id"], json!(env.item.id));

    let req = test::TestRequest::get().uri(&format!("/api/v1/deploy-test-runs/{}", run.id));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 404);

    let req = with_user(test::TestRequest::delete())
        .uri(&format!("/api/v1/test-items/{}/deploy-history", Uuid::now_v7()));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 404);
}

/// Active runs are counted until they finish.
#[actix_rt::test]
async fn test_processing_count() {
    let mock_state = MockState {
        polls: [json!({ "status": "running" })].into(),
        ..Default::default()
    };
    let env = setup(mock_state).await;
    let app = create_test_app(&env.service).await;

    let req = test::TestRequest::get().uri("/api/v1/processing-count");
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);

    // Polls keep answering "running", so the run stays in MONITORING.
    env.trigger().await;

    let req = test::TestRequest::get().uri("/api/v1/processing-count");
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 1);
}
