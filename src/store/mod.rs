//! Persistence seams used by the deploy-test pipeline.
//!
//! `RunStore` owns deploy-test runs; `Catalog` is the read-only view of test
//! items, build artifacts, parameter sets and system settings. The Postgres
//! implementations live in `crate::db`; `MemoryStore` backs tests.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    BuildArtifact, DeployTestRun, NewRun, ParameterSet, RunFilter, RunSettings, TestItem,
    setting_keys,
};

pub use crate::models::{RunUpdate, StepUpdate};
pub use memory::MemoryStore;

/// Durable record of deploy-test runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run in PENDING with an empty step log.
    async fn create_run(&self, new_run: NewRun) -> AppResult<DeployTestRun>;

    async fn get_run(&self, id: Uuid) -> AppResult<Option<DeployTestRun>>;

    /// Runs ordered by start time, newest first, plus the unpaged total.
    async fn list_runs(&self, filter: RunFilter) -> AppResult<(Vec<DeployTestRun>, u64)>;

    /// Apply a targeted update.
    ///
    /// Returns `false` when the stored status does not admit the update (see
    /// `RunUpdate::allowed_from`). A terminal status also sets `finished_at`.
    async fn apply_update(&self, id: Uuid, update: RunUpdate) -> AppResult<bool>;

    /// Upsert one step log entry by name.
    async fn upsert_step(&self, id: Uuid, step: StepUpdate) -> AppResult<()>;

    /// Delete every run of a test item; returns the number removed.
    async fn delete_runs_for_test_item(&self, test_item_id: Uuid) -> AppResult<u64>;

    /// Number of runs not yet in a terminal status.
    async fn count_active_runs(&self) -> AppResult<u64>;
}

/// Read-only lookups of catalog records.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_test_item(&self, id: Uuid) -> AppResult<Option<TestItem>>;

    async fn get_build_artifact(&self, id: Uuid) -> AppResult<Option<BuildArtifact>>;

    async fn get_parameter_set(&self, id: Uuid) -> AppResult<Option<ParameterSet>>;

    async fn find_parameter_set_by_name(&self, name: &str) -> AppResult<Option<ParameterSet>>;

    /// Value of a system setting. Empty values read as absent.
    async fn get_setting(&self, key: &str) -> AppResult<Option<String>>;

    /// Snapshot of every setting the pipeline reads.
    async fn run_settings(&self) -> AppResult<RunSettings> {
        Ok(RunSettings {
            download_base_url: self
                .get_setting(setting_keys::PACKAGE_DOWNLOAD_BASE_URL)
                .await?,
            test_server_url: self
                .get_setting(setting_keys::EXTERNAL_TEST_SERVER_URL)
                .await?,
            build_info_base_url: self
                .get_setting(setting_keys::PACKAGE_BUILD_INFO_BASE_URL)
                .await?,
            project_name: self.get_setting(setting_keys::PROJECT_NAME).await?,
        })
    }
}
