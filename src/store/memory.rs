//! In-memory store used by tests and local experiments.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Catalog, RunStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    BuildArtifact, DeployTestRun, NewRun, ParameterSet, RunFilter, RunStatus, RunUpdate,
    StepLog, StepUpdate, TestItem,
};

#[derive(Default)]
struct State {
    runs: HashMap<Uuid, DeployTestRun>,
    test_items: HashMap<Uuid, TestItem>,
    build_artifacts: HashMap<Uuid, BuildArtifact>,
    parameter_sets: HashMap<Uuid, ParameterSet>,
    settings: HashMap<String, String>,
}

/// Store keeping every record in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AppError::Database("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AppError::Database("memory store lock poisoned".to_string()))
    }

    pub fn insert_test_item(&self, item: TestItem) -> AppResult<()> {
        self.write()?.test_items.insert(item.id, item);
        Ok(())
    }

    pub fn insert_build_artifact(&self, artifact: BuildArtifact) -> AppResult<()> {
        self.write()?.build_artifacts.insert(artifact.id, artifact);
        Ok(())
    }

    pub fn insert_parameter_set(&self, set: ParameterSet) -> AppResult<()> {
        self.write()?.parameter_sets.insert(set.id, set);
        Ok(())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        self.write()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, new_run: NewRun) -> AppResult<DeployTestRun> {
        let run = DeployTestRun {
            id: Uuid::now_v7(),
            test_item_id: new_run.test_item_id,
            build_artifact_id: new_run.build_artifact_id,
            parameter_set_id: new_run.parameter_set_id,
            triggered_by: new_run.triggered_by,
            status: RunStatus::Pending,
            download_url: None,
            download_path: None,
            task_id: None,
            report_url: None,
            parameters: new_run.parameters,
            steps: Vec::new(),
            policy: new_run.policy,
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            response_raw_data: None,
        };
        self.write()?.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> AppResult<Option<DeployTestRun>> {
        Ok(self.read()?.runs.get(&id).cloned())
    }

    async fn list_runs(&self, filter: RunFilter) -> AppResult<(Vec<DeployTestRun>, u64)> {
        let state = self.read()?;
        let mut runs: Vec<DeployTestRun> = state
            .runs
            .values()
            .filter(|run| filter.test_item_id.is_none_or(|id| run.test_item_id == id))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));

        let total = runs.len() as u64;
        let page = runs
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn apply_update(&self, id: Uuid, update: RunUpdate) -> AppResult<bool> {
        let mut state = self.write()?;
        let Some(run) = state.runs.get_mut(&id) else {
            return Ok(false);
        };
        if !update.allowed_from().contains(&run.status) {
            return Ok(false);
        }

        let terminal = update.is_terminal();
        let RunUpdate {
            status,
            download_url,
            download_path,
            task_id,
            report_url,
            error_message,
            response_raw_data,
        } = update;

        if let Some(status) = status {
            run.status = status;
        }
        if terminal {
            run.finished_at = Some(Utc::now());
        }
        if download_url.is_some() {
            run.download_url = download_url;
        }
        if download_path.is_some() {
            run.download_path = download_path;
        }
        if task_id.is_some() {
            run.task_id = task_id;
        }
        if report_url.is_some() {
            run.report_url = report_url;
        }
        if error_message.is_some() {
            run.error_message = error_message;
        }
        if response_raw_data.is_some() {
            run.response_raw_data = response_raw_data;
        }
        Ok(true)
    }

    async fn upsert_step(&self, id: Uuid, step: StepUpdate) -> AppResult<()> {
        let mut state = self.write()?;
        let run = state
            .runs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Deploy test run {}", id)))?;

        let mut log = StepLog::from_json(&serde_json::to_value(&run.steps)?);
        log.apply(step, Utc::now());
        run.steps = log.into_entries();
        Ok(())
    }

    async fn delete_runs_for_test_item(&self, test_item_id: Uuid) -> AppResult<u64> {
        let mut state = self.write()?;
        let before = state.runs.len();
        state.runs.retain(|_, run| run.test_item_id != test_item_id);
        Ok((before - state.runs.len()) as u64)
    }

    async fn count_active_runs(&self) -> AppResult<u64> {
        Ok(self
            .read()?
            .runs
            .values()
            .filter(|run| !run.status.is_terminal())
            .count() as u64)
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_test_item(&self, id: Uuid) -> AppResult<Option<TestItem>> {
        Ok(self.read()?.test_items.get(&id).cloned())
    }

    async fn get_build_artifact(&self, id: Uuid) -> AppResult<Option<BuildArtifact>> {
        Ok(self.read()?.build_artifacts.get(&id).cloned())
    }

    async fn get_parameter_set(&self, id: Uuid) -> AppResult<Option<ParameterSet>> {
        Ok(self.read()?.parameter_sets.get(&id).cloned())
    }

    async fn find_parameter_set_by_name(&self, name: &str) -> AppResult<Option<ParameterSet>> {
        Ok(self
            .read()?
            .parameter_sets
            .values()
            .find(|set| set.name == name)
            .cloned())
    }

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .read()?
            .settings
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned())
    }
}
