//! Database queries for deploy-test runs.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::deploy_test_run::{self as run, ActiveModel, Entity as DeployTestRunEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    DeployTestRun, NewRun, PollPolicy, RunFilter, RunStatus, RunUpdate, StepLog, StepUpdate,
};
use crate::store::RunStore;

use super::DbPool;

fn status_strings(statuses: &[RunStatus]) -> Vec<&'static str> {
    statuses.iter().map(RunStatus::as_str).collect()
}

impl TryFrom<run::Model> for DeployTestRun {
    type Error = AppError;

    fn try_from(model: run::Model) -> Result<Self, Self::Error> {
        let status = RunStatus::parse(&model.status).ok_or_else(|| {
            AppError::InvalidFormat(format!(
                "Run {} has unknown status '{}'",
                model.id, model.status
            ))
        })?;

        Ok(DeployTestRun {
            id: model.id,
            test_item_id: model.test_item_id,
            build_artifact_id: model.build_artifact_id,
            parameter_set_id: model.parameter_set_id,
            triggered_by: model.triggered_by,
            status,
            download_url: model.download_url,
            download_path: model.download_path,
            task_id: model.task_id,
            report_url: model.report_url,
            parameters: serde_json::from_value(model.parameters).unwrap_or_default(),
            steps: StepLog::from_json(&model.steps).into_entries(),
            policy: PollPolicy {
                max_query_hours: model.max_query_hours,
                query_interval_seconds: model.query_interval_seconds,
                query_timeout_seconds: model.query_timeout_seconds,
            },
            started_at: model.started_at,
            finished_at: model.finished_at,
            error_message: model.error_message,
            response_raw_data: model.response_raw_data,
        })
    }
}

#[async_trait]
impl RunStore for DbPool {
    async fn create_run(&self, new_run: NewRun) -> AppResult<DeployTestRun> {
        let model = ActiveModel {
            id: Set(Uuid::now_v7()),
            test_item_id: Set(new_run.test_item_id),
            build_artifact_id: Set(new_run.build_artifact_id),
            parameter_set_id: Set(new_run.parameter_set_id),
            triggered_by: Set(new_run.triggered_by),
            status: Set(RunStatus::Pending.as_str().to_string()),
            download_url: Set(None),
            download_path: Set(None),
            task_id: Set(None),
            report_url: Set(None),
            parameters: Set(serde_json::to_value(&new_run.parameters)?),
            steps: Set(StepLog::new().to_json()),
            max_query_hours: Set(new_run.policy.max_query_hours),
            query_interval_seconds: Set(new_run.policy.query_interval_seconds),
            query_timeout_seconds: Set(new_run.policy.query_timeout_seconds),
            started_at: Set(Utc::now()),
            finished_at: Set(None),
            error_message: Set(None),
            response_raw_data: Set(None),
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert deploy test run: {}", e)))?;

        DeployTestRun::try_from(result)
    }

    async fn get_run(&self, id: Uuid) -> AppResult<Option<DeployTestRun>> {
        let result = DeployTestRunEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get deploy test run: {}", e)))?;

        result.map(DeployTestRun::try_from).transpose()
    }

    async fn list_runs(&self, filter: RunFilter) -> AppResult<(Vec<DeployTestRun>, u64)> {
        let mut query = DeployTestRunEntity::find();
        if let Some(test_item_id) = filter.test_item_id {
            query = query.filter(run::Column::TestItemId.eq(test_item_id));
        }

        let total = query
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count deploy test runs: {}", e)))?;

        let models = query
            .order_by_desc(run::Column::StartedAt)
            .order_by_desc(run::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list deploy test runs: {}", e)))?;

        let runs = models
            .into_iter()
            .map(DeployTestRun::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((runs, total))
    }

    async fn apply_update(&self, id: Uuid, update: RunUpdate) -> AppResult<bool> {
        if update == RunUpdate::default() {
            return Ok(false);
        }

        let allowed = status_strings(&update.allowed_from());
        let terminal = update.is_terminal();

        let mut query = DeployTestRunEntity::update_many()
            .filter(run::Column::Id.eq(id))
            .filter(run::Column::Status.is_in(allowed));

        if let Some(status) = update.status {
            query = query.col_expr(run::Column::Status, Expr::value(status.as_str()));
        }
        if terminal {
            query = query.col_expr(run::Column::FinishedAt, Expr::value(Some(Utc::now())));
        }
        if let Some(download_url) = update.download_url {
            query = query.col_expr(run::Column::DownloadUrl, Expr::value(download_url));
        }
        if let Some(download_path) = update.download_path {
            query = query.col_expr(run::Column::DownloadPath, Expr::value(download_path));
        }
        if let Some(task_id) = update.task_id {
            query = query.col_expr(run::Column::TaskId, Expr::value(task_id));
        }
        if let Some(report_url) = update.report_url {
            query = query.col_expr(run::Column::ReportUrl, Expr::value(report_url));
        }
        if let Some(error_message) = update.error_message {
            query = query.col_expr(run::Column::ErrorMessage, Expr::value(error_message));
        }
        if let Some(raw) = update.response_raw_data {
            query = query.col_expr(run::Column::ResponseRawData, Expr::value(raw));
        }

        let result = query
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update deploy test run: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    async fn upsert_step(&self, id: Uuid, step: StepUpdate) -> AppResult<()> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let current = DeployTestRunEntity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to lock deploy test run: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Deploy test run {}", id)))?;

        let mut log = StepLog::from_json(&current.steps);
        log.apply(step, Utc::now());

        DeployTestRunEntity::update_many()
            .col_expr(run::Column::Steps, Expr::value(log.to_json()))
            .filter(run::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update step log: {}", e)))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit step log: {}", e)))?;

        Ok(())
    }

    async fn delete_runs_for_test_item(&self, test_item_id: Uuid) -> AppResult<u64> {
        let result = DeployTestRunEntity::delete_many()
            .filter(run::Column::TestItemId.eq(test_item_id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to clear deploy history: {}", e)))?;

        Ok(result.rows_affected)
    }

    async fn count_active_runs(&self) -> AppResult<u64> {
        let count = DeployTestRunEntity::find()
            .filter(run::Column::Status.is_in(status_strings(&RunStatus::active())))
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count active runs: {}", e)))?;

        Ok(count)
    }
}
