//! Deploy-test run API handlers.

use actix_web::{HttpResponse, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::TriggeredBy;
use crate::error::{AppError, AppResult};
use crate::models::{
    ClearHistoryResponse, DeployRunListResponse, DeployTestRun, ListRunsQuery,
    ProcessingCountResponse, TriggerDeployTestRequest,
};
use crate::services::DeployTestService;

/// Trigger a deploy test of a build artifact for a test item.
///
/// The run is created PENDING and its pipeline continues in the background;
/// poll the run to follow its progress.
#[utoipa::path(
    post,
    path = "/api/v1/test-items/{test_item_id}/deploy-test",
    tag = "Deploy Tests",
    params(
        ("test_item_id" = Uuid, Path, description = "Test item UUID"),
        ("X-User-Email" = String, Header, description = "Triggering user")
    ),
    request_body = TriggerDeployTestRequest,
    responses(
        (status = 202, description = "Run accepted", body = DeployTestRun),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing user header", body = crate::error::ErrorResponse),
        (status = 404, description = "Test item, artifact or parameter set not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn trigger_deploy_test(
    user: TriggeredBy,
    service: web::Data<DeployTestService>,
    path: web::Path<Uuid>,
    body: web::Json<TriggerDeployTestRequest>,
) -> AppResult<HttpResponse> {
    let test_item_id = path.into_inner();
    let req = body.into_inner();

    let run = service
        .trigger(
            test_item_id,
            req.build_artifact_id,
            &user.0,
            req.parameter_set_id,
        )
        .await?;

    Ok(HttpResponse::Accepted().json(run))
}

/// List the runs of one test item, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/test-items/{test_item_id}/deploy-runs",
    tag = "Deploy Tests",
    params(
        ("test_item_id" = Uuid, Path, description = "Test item UUID"),
        ("limit" = Option<i64>, Query, description = "Results per page (default 20, max 100)"),
        ("offset" = Option<i64>, Query, description = "Pagination offset")
    ),
    responses(
        (status = 200, description = "Runs of the test item", body = DeployRunListResponse),
    )
)]
pub async fn list_runs_for_item(
    service: web::Data<DeployTestService>,
    path: web::Path<Uuid>,
    query: web::Query<ListRunsQuery>,
) -> AppResult<HttpResponse> {
    let mut query = query.into_inner();
    query.test_item_id = Some(path.into_inner());
    list(&service, &query).await
}

/// List runs across test items, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/deploy-test-runs",
    tag = "Deploy Tests",
    params(
        ("test_item_id" = Option<Uuid>, Query, description = "Filter by test item"),
        ("limit" = Option<i64>, Query, description = "Results per page (default 20, max 100)"),
        ("offset" = Option<i64>, Query, description = "Pagination offset")
    ),
    responses(
        (status = 200, description = "List of runs", body = DeployRunListResponse),
    )
)]
pub async fn list_runs(
    service: web::Data<DeployTestService>,
    query: web::Query<ListRunsQuery>,
) -> AppResult<HttpResponse> {
    list(&service, &query).await
}

async fn list(service: &DeployTestService, query: &ListRunsQuery) -> AppResult<HttpResponse> {
    let limit = query.effective_limit();
    let offset = query.effective_offset();
    let (runs, total) = service.list_runs(query.test_item_id, limit, offset).await?;

    Ok(HttpResponse::Ok().json(DeployRunListResponse {
        runs,
        total,
        limit,
        offset,
    }))
}

/// Get a single run with its step log.
#[utoipa::path(
    get,
    path = "/api/v1/deploy-test-runs/{run_id}",
    tag = "Deploy Tests",
    params(
        ("run_id" = Uuid, Path, description = "Run UUID")
    ),
    responses(
        (status = 200, description = "Run details", body = DeployTestRun),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_run(
    service: web::Data<DeployTestService>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let run = service.get_run(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Delete every run recorded for a test item.
#[utoipa::path(
    delete,
    path = "/api/v1/test-items/{test_item_id}/deploy-history",
    tag = "Deploy Tests",
    params(
        ("test_item_id" = Uuid, Path, description = "Test item UUID"),
        ("X-User-Email" = String, Header, description = "Requesting user")
    ),
    responses(
        (status = 200, description = "History cleared", body = ClearHistoryResponse),
        (status = 401, description = "Missing user header", body = crate::error::ErrorResponse),
        (status = 404, description = "Test item not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn clear_history(
    user: TriggeredBy,
    service: web::Data<DeployTestService>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let test_item_id = path.into_inner();
    let deleted_count = service.clear_history(test_item_id).await?;

    info!(
        test_item_id = %test_item_id,
        deleted_count,
        requested_by = %user.0,
        "Deploy history cleared"
    );

    Ok(HttpResponse::Ok().json(ClearHistoryResponse {
        test_item_id,
        deleted_count,
    }))
}

/// Number of runs that have not finished yet.
#[utoipa::path(
    get,
    path = "/api/v1/processing-count",
    tag = "Deploy Tests",
    responses(
        (status = 200, description = "Active run count", body = ProcessingCountResponse),
    )
)]
pub async fn processing_count(service: web::Data<DeployTestService>) -> AppResult<HttpResponse> {
    let count = service.processing_count().await?;
    Ok(HttpResponse::Ok().json(ProcessingCountResponse { count }))
}

/// Configure deploy-test routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into()),
    )
    .service(
        web::resource("/test-items/{test_item_id}/deploy-test")
            .route(web::post().to(trigger_deploy_test)),
    )
    .service(
        web::resource("/test-items/{test_item_id}/deploy-runs")
            .route(web::get().to(list_runs_for_item)),
    )
    .service(
        web::resource("/test-items/{test_item_id}/deploy-history")
            .route(web::delete().to(clear_history)),
    )
    .service(web::resource("/deploy-test-runs").route(web::get().to(list_runs)))
    .service(web::resource("/deploy-test-runs/{run_id}").route(web::get().to(get_run)))
    .service(web::resource("/processing-count").route(web::get().to(processing_count)));
}
