//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRAT Deploy Test Server",
        version = "0.1.0",
        description = "Deploys build artifacts to test hosts, drives the external test service and tracks each run"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Deploy test endpoints
        api::deploy_runs::trigger_deploy_test,
        api::deploy_runs::list_runs_for_item,
        api::deploy_runs::list_runs,
        api::deploy_runs::get_run,
        api::deploy_runs::clear_history,
        api::deploy_runs::processing_count,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Runs
            models::RunStatus,
            models::StepName,
            models::StepStatus,
            models::StepRecord,
            models::PollPolicy,
            models::TestParameters,
            models::DeployTestRun,
            models::TriggerDeployTestRequest,
            models::DeployRunListResponse,
            models::ClearHistoryResponse,
            models::ProcessingCountResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Deploy Tests", description = "Trigger and follow deploy-test runs")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_deploy_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/api/v1/deploy-test-runs/{run_id}"));
        assert!(paths.iter().any(|p| *p == "/api/v1/test-items/{test_item_id}/deploy-test"));
    }
}
