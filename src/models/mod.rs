//! Domain models for the deploy-test server.

pub mod api;
pub mod catalog;
pub mod run;

// Re-export commonly used types
pub use api::{
    ClearHistoryResponse, DeployRunListResponse, ListRunsQuery, ProcessingCountResponse,
    TriggerDeployTestRequest,
};
pub use catalog::{
    BuildArtifact, DEFAULT_PARAMETER_SET, DEFAULT_UPGRADE_TYPE, DEPLOY_ONLY_TEST_PATH,
    ParameterSet, RunSettings, TestItem, TestParameters, join_url, setting_keys,
};
pub use run::{
    DeployTestRun, NewRun, PollPolicy, RunFilter, RunStatus, RunUpdate, StepLog, StepName,
    StepRecord, StepStatus, StepUpdate,
};
