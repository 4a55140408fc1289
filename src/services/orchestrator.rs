//! Deploy-test orchestration.
//!
//! A trigger validates its references, creates the run in PENDING and spawns
//! the stage sequence as its own task:
//!
//! 1. download: PENDING -> DOWNLOADING -> DOWNLOADED
//! 2. dispatch: DOWNLOADED -> TESTING
//! 3. monitor: TESTING -> MONITORING -> COMPLETED | DEPLOY_COMPLETE | FAILED
//! 4. notify (best effort, never changes the run status)
//!
//! Stages talk to each other only through the persisted run. The first stage
//! error fails the run and skips the remaining stages.

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::external::{DispatchError, DispatchRequest, ExternalTestService};
use super::fetcher::{ArtifactFetcher, FetchError};
use super::gateway::HttpGateway;
use super::locator::{ArtifactLocator, LocateError};
use super::monitor::{MonitorOutcome, monitor_task};
use super::notifier::{DEFAULT_PROJECT_NAME, Notice, Notifier};
use super::params::resolve_parameters;
use crate::config::PipelineSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    BuildArtifact, DeployTestRun, NewRun, PollPolicy, RunFilter, RunSettings, RunStatus,
    RunUpdate, StepName, StepStatus, StepUpdate, TestItem, TestParameters, join_url,
    setting_keys,
};
use crate::store::{Catalog, RunStore};

/// Why a single stage stopped.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error("setting '{0}' is not configured")]
    MissingSetting(&'static str),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("no download path recorded for run")]
    MissingDownloadPath,

    #[error("no task_id available")]
    MissingTaskId,

    #[error("external test failed: {0}")]
    ExternalFailure(String),

    #[error("monitoring timed out after {0} hours")]
    TimedOut(i32),

    #[error("run is no longer active")]
    Inactive,

    #[error(transparent)]
    Store(#[from] AppError),
}

/// A failed run, tagged with the stage it failed in.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Download failed: {0}")]
    Download(StageFailure),

    #[error("Trigger test failed: {0}")]
    Test(StageFailure),

    #[error("Monitor failed: {0}")]
    Monitor(StageFailure),

    #[error("Unexpected fault: {0}")]
    Fault(String),
}

impl StageError {
    fn step(&self) -> Option<StepName> {
        match self {
            Self::Download(_) => Some(StepName::Download),
            Self::Test(_) => Some(StepName::Test),
            Self::Monitor(_) => Some(StepName::Monitor),
            Self::Fault(_) => None,
        }
    }

    /// Stage-scoped text for the step log.
    fn step_error(&self) -> String {
        match self {
            Self::Download(f) | Self::Test(f) | Self::Monitor(f) => f.to_string(),
            Self::Fault(message) => message.clone(),
        }
    }

    fn is_inactive(&self) -> bool {
        matches!(
            self,
            Self::Download(StageFailure::Inactive)
                | Self::Test(StageFailure::Inactive)
                | Self::Monitor(StageFailure::Inactive)
        )
    }
}

/// Successful end of the stage sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Finished {
    Completed { report_url: Option<String> },
    DeployComplete,
}

/// Everything a run's task needs, captured when the run is triggered.
#[derive(Debug, Clone)]
struct RunContext {
    run_id: Uuid,
    triggered_by: String,
    item: TestItem,
    artifact: BuildArtifact,
    parameters: TestParameters,
    policy: PollPolicy,
    settings: RunSettings,
}

impl RunContext {
    fn notice(&self) -> Notice {
        let build_url = self.settings.build_info_base_url.as_deref().map(|base| {
            join_url(
                base,
                &format!("{}/{}", self.artifact.job_name, self.artifact.build_number),
            )
        });

        Notice {
            recipient: self.triggered_by.clone(),
            test_name: self.item.name.clone(),
            build_label: self.artifact.label(),
            build_url,
            project_name: self
                .settings
                .project_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
        }
    }
}

/// Directory URL of a package; always ends with a slash.
fn package_dir_url(base: &str, package_path: &str) -> String {
    let url = join_url(base, package_path);
    if url.ends_with('/') {
        url
    } else {
        format!("{}/", url)
    }
}

fn fault_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "run task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "run task panicked".to_string()
    }
}

/// Entry point for triggering and observing deploy-test runs.
#[derive(Clone)]
pub struct DeployTestService {
    runs: Arc<dyn RunStore>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn HttpGateway>,
    notifier: Arc<dyn Notifier>,
    locator: ArtifactLocator,
    fetcher: ArtifactFetcher,
    settings: PipelineSettings,
}

impl DeployTestService {
    pub fn new(
        runs: Arc<dyn RunStore>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn HttpGateway>,
        notifier: Arc<dyn Notifier>,
        http_client: reqwest::Client,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            runs,
            catalog,
            gateway,
            notifier,
            locator: ArtifactLocator::new(http_client.clone()),
            fetcher: ArtifactFetcher::new(http_client, settings.fetch_timeout),
            settings,
        }
    }

    /// Create a PENDING run and start its pipeline in the background.
    pub async fn trigger(
        &self,
        test_item_id: Uuid,
        build_artifact_id: Uuid,
        triggered_by: &str,
        parameter_set_id: Option<Uuid>,
    ) -> AppResult<DeployTestRun> {
        let triggered_by = triggered_by.trim();
        if triggered_by.is_empty() {
            return Err(AppError::InvalidInput(
                "triggered_by must not be empty".to_string(),
            ));
        }

        let item = self
            .catalog
            .get_test_item(test_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test item {}", test_item_id)))?;
        let artifact = self
            .catalog
            .get_build_artifact(build_artifact_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Build artifact {}", build_artifact_id)))?;

        let resolved = resolve_parameters(self.catalog.as_ref(), &item, parameter_set_id).await?;
        let settings = self.catalog.run_settings().await?;
        let policy = self.settings.poll_defaults;

        let run = self
            .runs
            .create_run(NewRun {
                test_item_id,
                build_artifact_id,
                parameter_set_id: resolved.parameter_set_id,
                triggered_by: triggered_by.to_string(),
                parameters: resolved.parameters.clone(),
                policy,
            })
            .await?;

        info!(
            run_id = %run.id,
            test_item = %item.name,
            build = %artifact.label(),
            triggered_by,
            "Deploy test triggered"
        );

        self.spawn(RunContext {
            run_id: run.id,
            triggered_by: triggered_by.to_string(),
            item,
            artifact,
            parameters: resolved.parameters,
            policy,
            settings,
        });

        Ok(run)
    }

    pub async fn get_run(&self, run_id: Uuid) -> AppResult<DeployTestRun> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Deploy test run {}", run_id)))
    }

    /// Runs newest first with the unpaged total.
    pub async fn list_runs(
        &self,
        test_item_id: Option<Uuid>,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<DeployTestRun>, u64)> {
        self.runs
            .list_runs(RunFilter {
                test_item_id,
                limit,
                offset,
            })
            .await
    }

    /// Delete every run of a test item.
    pub async fn clear_history(&self, test_item_id: Uuid) -> AppResult<u64> {
        let item = self
            .catalog
            .get_test_item(test_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test item {}", test_item_id)))?;

        let deleted = self.runs.delete_runs_for_test_item(test_item_id).await?;
        info!(test_item = %item.name, deleted, "Cleared deploy test history");
        Ok(deleted)
    }

    /// Number of runs still in progress.
    pub async fn processing_count(&self) -> AppResult<u64> {
        self.runs.count_active_runs().await
    }

    fn spawn(&self, ctx: RunContext) {
        let service = self.clone();
        let span = info_span!("deploy_test", run_id = %ctx.run_id);

        tokio::spawn(
            async move {
                let fallback = ctx.clone();
                let stages = tokio::spawn(service.clone().execute(ctx).in_current_span());

                if let Err(join_err) = stages.await {
                    let failure = StageError::Fault(fault_message(join_err));
                    error!(error = %failure, "Deploy test task aborted");
                    if service.record_failure(&fallback, &failure).await {
                        service.notify_failure(&fallback, &failure.to_string()).await;
                    }
                }
            }
            .instrument(span),
        );
    }

    async fn execute(self, ctx: RunContext) {
        match self.run_stages(&ctx).await {
            Ok(Finished::Completed { report_url }) => {
                info!(report_url = ?report_url, "Deploy test completed");
                self.notify_success(&ctx, report_url.as_deref()).await;
            }
            Ok(Finished::DeployComplete) => {
                info!("Deploy-only run completed, notification suppressed");
            }
            Err(failure) if failure.is_inactive() => {
                warn!(error = %failure, "Run stopped outside the pipeline, abandoning");
            }
            Err(failure) => {
                if self.record_failure(&ctx, &failure).await {
                    self.notify_failure(&ctx, &failure.to_string()).await;
                }
            }
        }
    }

    async fn run_stages(&self, ctx: &RunContext) -> Result<Finished, StageError> {
        self.download(ctx).await.map_err(StageError::Download)?;
        self.dispatch(ctx).await.map_err(StageError::Test)?;
        self.monitor(ctx).await.map_err(StageError::Monitor)
    }

    async fn download(&self, ctx: &RunContext) -> Result<(), StageFailure> {
        self.apply(ctx.run_id, RunUpdate::status(RunStatus::Downloading))
            .await?;
        self.runs
            .upsert_step(
                ctx.run_id,
                StepUpdate::running(StepName::Download, "Starting package download"),
            )
            .await?;

        let base = ctx
            .settings
            .download_base_url
            .as_deref()
            .ok_or(StageFailure::MissingSetting(
                setting_keys::PACKAGE_DOWNLOAD_BASE_URL,
            ))?;
        let dir_url = package_dir_url(base, &ctx.artifact.package_path);

        let filename = self.locator.locate(&dir_url, &ctx.item.name).await?;
        let download_url = format!("{}{}", dir_url, filename);
        let dest = self
            .settings
            .download_dir
            .join(ctx.run_id.to_string())
            .join(&filename);

        let bytes = self.fetcher.fetch(&download_url, &dest).await?;
        let download_path = dest.display().to_string();

        self.apply(
            ctx.run_id,
            RunUpdate {
                status: Some(RunStatus::Downloaded),
                download_url: Some(download_url),
                download_path: Some(download_path.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.runs
            .upsert_step(
                ctx.run_id,
                StepUpdate::completed(
                    StepName::Download,
                    format!("Package downloaded to {} ({} bytes)", download_path, bytes),
                ),
            )
            .await?;

        Ok(())
    }

    async fn dispatch(&self, ctx: &RunContext) -> Result<(), StageFailure> {
        self.apply(ctx.run_id, RunUpdate::status(RunStatus::Testing))
            .await?;
        self.runs
            .upsert_step(
                ctx.run_id,
                StepUpdate::running(StepName::Test, "Triggering external test"),
            )
            .await?;

        let run = self
            .runs
            .get_run(ctx.run_id)
            .await?
            .ok_or(StageFailure::Inactive)?;
        let package_path = run
            .download_path
            .filter(|path| !path.is_empty())
            .ok_or(StageFailure::MissingDownloadPath)?;

        let service = self.external_service(ctx)?;
        let params = &ctx.parameters;
        let request = DispatchRequest {
            service_name: params.service_name.clone(),
            package_path,
            install_dir: params.install_dir.clone(),
            upgrade_type: params.upgrade_type.clone(),
            test_path: params.test_path.clone(),
            base_url: params.base_url.clone(),
            report_keyword: params.report_keyword.clone(),
        };

        let task_id = service
            .dispatch(&request, self.settings.dispatch_timeout)
            .await?;
        info!(task_id = %task_id, "External test dispatched");

        self.apply(
            ctx.run_id,
            RunUpdate {
                task_id: Some(task_id.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.runs
            .upsert_step(
                ctx.run_id,
                StepUpdate::completed(
                    StepName::Test,
                    format!("Test triggered, task_id: {}", task_id),
                ),
            )
            .await?;

        Ok(())
    }

    async fn monitor(&self, ctx: &RunContext) -> Result<Finished, StageFailure> {
        self.apply(ctx.run_id, RunUpdate::status(RunStatus::Monitoring))
            .await?;
        self.runs
            .upsert_step(
                ctx.run_id,
                StepUpdate::running(StepName::Monitor, "Monitoring test progress"),
            )
            .await?;

        let run = self
            .runs
            .get_run(ctx.run_id)
            .await?
            .ok_or(StageFailure::Inactive)?;
        let task_id = run
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or(StageFailure::MissingTaskId)?;

        let service = self.external_service(ctx)?;
        let outcome = monitor_task(
            &service,
            &task_id,
            &ctx.policy,
            ctx.parameters.is_deploy_only(),
        )
        .await;

        match outcome {
            MonitorOutcome::Completed { report_url, raw } => {
                self.apply(
                    ctx.run_id,
                    RunUpdate {
                        status: Some(RunStatus::Completed),
                        report_url: report_url.clone(),
                        response_raw_data: Some(raw),
                        ..Default::default()
                    },
                )
                .await?;
                self.runs
                    .upsert_step(
                        ctx.run_id,
                        StepUpdate::completed(
                            StepName::Monitor,
                            format!(
                                "Test completed, report URL: {}",
                                report_url.as_deref().unwrap_or("none")
                            ),
                        ),
                    )
                    .await?;
                Ok(Finished::Completed { report_url })
            }
            MonitorOutcome::DeployComplete { raw } => {
                self.apply(
                    ctx.run_id,
                    RunUpdate {
                        status: Some(RunStatus::DeployComplete),
                        response_raw_data: Some(raw),
                        ..Default::default()
                    },
                )
                .await?;
                self.runs
                    .upsert_step(
                        ctx.run_id,
                        StepUpdate::completed(StepName::Monitor, "Deployment completed"),
                    )
                    .await?;
                Ok(Finished::DeployComplete)
            }
            MonitorOutcome::Failed { error, raw } => {
                self.apply(
                    ctx.run_id,
                    RunUpdate {
                        response_raw_data: Some(raw),
                        ..Default::default()
                    },
                )
                .await?;
                Err(StageFailure::ExternalFailure(error))
            }
            MonitorOutcome::TimedOut { hours } => Err(StageFailure::TimedOut(hours)),
        }
    }

    fn external_service(&self, ctx: &RunContext) -> Result<ExternalTestService, StageFailure> {
        let base = ctx
            .settings
            .test_server_url
            .as_deref()
            .ok_or(StageFailure::MissingSetting(
                setting_keys::EXTERNAL_TEST_SERVER_URL,
            ))?;
        Ok(ExternalTestService::new(base, self.gateway.clone()))
    }

    async fn apply(&self, run_id: Uuid, update: RunUpdate) -> Result<(), StageFailure> {
        if self.runs.apply_update(run_id, update).await? {
            Ok(())
        } else {
            Err(StageFailure::Inactive)
        }
    }

    /// Record the failed step and move the run to FAILED.
    ///
    /// A fault has no owning stage, so every step still RUNNING is closed
    /// with the fault text instead. Returns whether this call ended the run.
    async fn record_failure(&self, ctx: &RunContext, failure: &StageError) -> bool {
        match failure.step() {
            Some(step) => {
                self.record_step(ctx.run_id, StepUpdate::failed(step, failure.step_error()))
                    .await
            }
            None => self.fail_open_steps(ctx.run_id, &failure.step_error()).await,
        }

        let message = failure.to_string();
        match self
            .runs
            .apply_update(ctx.run_id, RunUpdate::failed(message.clone()))
            .await
        {
            Ok(true) => {
                error!(error = %message, "Deploy test failed");
                true
            }
            Ok(false) => {
                warn!(error = %message, "Run already finished or removed, failure not recorded");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to mark run as failed");
                false
            }
        }
    }

    async fn fail_open_steps(&self, run_id: Uuid, error: &str) {
        let run = match self.runs.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read step log");
                return;
            }
        };

        for step in run.steps.iter().filter(|s| s.status == StepStatus::Running) {
            self.record_step(run_id, StepUpdate::failed(step.name, error))
                .await;
        }
    }

    async fn notify_success(&self, ctx: &RunContext, report_url: Option<&str>) {
        if !self.begin_notify(ctx).await {
            return;
        }
        let notice = ctx.notice();
        let result = self.notifier.notify_success(&notice, report_url).await;
        self.finish_notify(ctx, &notice, "Success", result).await;
    }

    async fn notify_failure(&self, ctx: &RunContext, error_message: &str) {
        if !self.begin_notify(ctx).await {
            return;
        }
        let notice = ctx.notice();
        let result = self.notifier.notify_failure(&notice, error_message).await;
        self.finish_notify(ctx, &notice, "Failure", result).await;
    }

    /// Returns false when notifications are disabled for the test item.
    async fn begin_notify(&self, ctx: &RunContext) -> bool {
        if !ctx.item.notification_enabled {
            self.record_step(
                ctx.run_id,
                StepUpdate::completed(
                    StepName::Notify,
                    "Notification disabled for this test item",
                ),
            )
            .await;
            return false;
        }
        self.record_step(
            ctx.run_id,
            StepUpdate::running(StepName::Notify, "Sending notification"),
        )
        .await;
        true
    }

    async fn finish_notify(
        &self,
        ctx: &RunContext,
        notice: &Notice,
        kind: &str,
        result: Result<(), super::notifier::NotifyError>,
    ) {
        let update = match result {
            Ok(()) => StepUpdate::completed(
                StepName::Notify,
                format!("{} notification sent to {}", kind, notice.recipient),
            ),
            Err(e) => {
                warn!(error = %e, "Notification failed");
                StepUpdate::failed(
                    StepName::Notify,
                    format!("Failed to send {} notification: {}", kind.to_lowercase(), e),
                )
            }
        };
        self.record_step(ctx.run_id, update).await;
    }

    /// Step write whose failure is only logged.
    async fn record_step(&self, run_id: Uuid, update: StepUpdate) {
        if let Err(e) = self.runs.upsert_step(run_id, update).await {
            warn!(error = %e, "Failed to record step");
        }
    }
}
