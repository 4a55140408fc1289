//! Deploy-test run domain models.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::TestParameters;

/// Lifecycle status of a deploy-test run.
///
/// Statuses only move forward; the three terminal statuses accept no further
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run created, pipeline not started yet.
    Pending,
    /// Locating and fetching the package.
    Downloading,
    /// Package stored locally.
    Downloaded,
    /// Dispatching the package to the external test service.
    Testing,
    /// Polling the external task.
    Monitoring,
    /// Tests finished and a report is available.
    Completed,
    /// Deploy-only run finished.
    DeployComplete,
    /// A stage failed.
    Failed,
}

impl RunStatus {
    pub const ALL: [RunStatus; 8] = [
        Self::Pending,
        Self::Downloading,
        Self::Downloaded,
        Self::Testing,
        Self::Monitoring,
        Self::Completed,
        Self::DeployComplete,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Testing => "TESTING",
            Self::Monitoring => "MONITORING",
            Self::Completed => "COMPLETED",
            Self::DeployComplete => "DEPLOY_COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeployComplete | Self::Failed)
    }

    /// Position in the forward ordering. Terminal statuses share the last rank.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Downloading => 1,
            Self::Downloaded => 2,
            Self::Testing => 3,
            Self::Monitoring => 4,
            Self::Completed | Self::DeployComplete | Self::Failed => 5,
        }
    }

    /// Whether a run currently in `self` may move to `next`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Statuses from which `self` can be entered.
    pub fn predecessors(&self) -> Vec<RunStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }

    /// Statuses a run can be in while still making progress.
    pub fn active() -> Vec<RunStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| !status.is_terminal())
            .collect()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage recorded in the step log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Download,
    Test,
    Monitor,
    Notify,
}

/// Status of a single step entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One entry of a run's step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepRecord {
    pub name: StepName,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A change to one step, keyed by step name.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub name: StepName,
    pub status: StepStatus,
    pub details: Option<String>,
    pub error: Option<String>,
}

impl StepUpdate {
    pub fn running(name: StepName, details: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Running,
            details: Some(details.into()),
            error: None,
        }
    }

    pub fn completed(name: StepName, details: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Completed,
            details: Some(details.into()),
            error: None,
        }
    }

    pub fn failed(name: StepName, error: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Failed,
            details: None,
            error: Some(error.into()),
        }
    }
}

/// Ordered step log with at most one entry per step name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepLog(Vec<StepRecord>);

impl StepLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn entries(&self) -> &[StepRecord] {
        &self.0
    }

    pub fn into_entries(self) -> Vec<StepRecord> {
        self.0
    }

    pub fn get(&self, name: StepName) -> Option<&StepRecord> {
        self.0.iter().find(|step| step.name == name)
    }

    /// Insert a new entry or update the existing one for `update.name`.
    ///
    /// The start time is kept from the first write. Empty details/error leave
    /// the previous text in place.
    pub fn apply(&mut self, update: StepUpdate, now: DateTime<Utc>) {
        let end_time = update.status.is_finished().then_some(now);

        match self.0.iter_mut().find(|step| step.name == update.name) {
            Some(step) => {
                step.status = update.status;
                if end_time.is_some() {
                    step.end_time = end_time;
                }
                if let Some(details) = update.details.filter(|d| !d.is_empty()) {
                    step.details = Some(details);
                }
                if let Some(error) = update.error.filter(|e| !e.is_empty()) {
                    step.error = Some(error);
                }
            }
            None => self.0.push(StepRecord {
                name: update.name,
                status: update.status,
                start_time: now,
                end_time,
                details: update.details.filter(|d| !d.is_empty()),
                error: update.error.filter(|e| !e.is_empty()),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }

    /// Decode a stored log. Unreadable content yields an empty log.
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Polling policy stamped onto a run at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PollPolicy {
    pub max_query_hours: i32,
    pub query_interval_seconds: i32,
    pub query_timeout_seconds: i32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_query_hours: 3,
            query_interval_seconds: 60,
            query_timeout_seconds: 30,
        }
    }
}

impl PollPolicy {
    /// Wall-clock budget for the whole polling loop.
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.max_query_hours.max(0) as u64 * 3600)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_seconds.max(0) as u64)
    }

    /// Per-poll request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds.max(1) as u64)
    }
}

/// Persisted record of one deploy-test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeployTestRun {
    pub id: Uuid,
    pub test_item_id: Uuid,
    pub build_artifact_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_set_id: Option<Uuid>,
    pub triggered_by: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    /// Resolved test parameters used by this run.
    pub parameters: TestParameters,
    pub steps: Vec<StepRecord>,
    #[serde(flatten)]
    pub policy: PollPolicy,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Raw body of the terminal poll response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_raw_data: Option<String>,
}

impl DeployTestRun {
    pub fn step(&self, name: StepName) -> Option<&StepRecord> {
        self.steps.iter().find(|step| step.name == name)
    }
}

/// Values needed to create a run in PENDING.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub test_item_id: Uuid,
    pub build_artifact_id: Uuid,
    pub parameter_set_id: Option<Uuid>,
    pub triggered_by: String,
    pub parameters: TestParameters,
    pub policy: PollPolicy,
}

/// Targeted field update for a run.
///
/// `None` fields are left untouched. With a `status`, the update only applies
/// while the stored status is one of that status' predecessors; without one it
/// only applies to a run that has not reached a terminal status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub download_url: Option<String>,
    pub download_path: Option<String>,
    pub task_id: Option<String>,
    pub report_url: Option<String>,
    pub error_message: Option<String>,
    pub response_raw_data: Option<String>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Statuses the stored run must be in for this update to apply.
    pub fn allowed_from(&self) -> Vec<RunStatus> {
        match self.status {
            Some(next) => next.predecessors(),
            None => RunStatus::active(),
        }
    }

    /// Whether this update ends the run.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|status| status.is_terminal())
    }
}

/// Filter for listing runs.
#[derive(Debug, Clone, Copy)]
pub struct RunFilter {
    pub test_item_id: Option<Uuid>,
    pub limit: u64,
    pub offset: u64,
}
