//! Request and response bodies of the deploy-test HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::DeployTestRun;

/// Body of a deploy-test trigger.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TriggerDeployTestRequest {
    pub build_artifact_id: Uuid,
    #[serde(default)]
    pub parameter_set_id: Option<Uuid>,
}

fn default_limit() -> i64 {
    20
}

/// Query parameters for listing runs.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ListRunsQuery {
    /// Filter by test item.
    #[serde(default)]
    pub test_item_id: Option<Uuid>,
    /// Maximum results to return (1-100, default 20).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Results to skip.
    #[serde(default)]
    pub offset: i64,
}

impl Default for ListRunsQuery {
    fn default() -> Self {
        Self {
            test_item_id: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ListRunsQuery {
    /// Out-of-range limits fall back to the default rather than erroring.
    pub fn effective_limit(&self) -> u64 {
        if (1..=100).contains(&self.limit) {
            self.limit as u64
        } else {
            default_limit() as u64
        }
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.max(0) as u64
    }
}

/// Page of runs, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeployRunListResponse {
    pub runs: Vec<DeployTestRun>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearHistoryResponse {
    pub test_item_id: Uuid,
    pub deleted_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessingCountResponse {
    /// Runs that have not reached a terminal status.
    pub count: u64,
}
