//! Wire client for the external test-execution service.
//!
//! - Dispatch: `POST {base}/api/deploy_and_test` returning `{"task_id": "..."}`
//! - Poll: `GET {base}/api/tasks/{task_id}` returning
//!   `{"status": "pending"|"running"|"completed"|"failed", "result"?: {...}, "error"?: "..."}`

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::gateway::{GatewayError, GatewayRequest, HttpGateway};
use crate::models::join_url;

/// Longest response body excerpt kept in error messages.
const BODY_EXCERPT_LEN: usize = 500;

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("HTTP status code: {status}, body: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Malformed(String),

    #[error("no task_id in response")]
    MissingTaskId,
}

/// A poll that produced no usable status; the monitor retries these.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unexpected status code when querying task: {0}")]
    Status(u16),

    #[error("failed to parse task status response: {0}")]
    Malformed(String),
}

/// Body of the dispatch call. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub service_name: String,
    pub package_path: String,
    pub install_dir: String,
    pub upgrade_type: String,
    pub test_path: String,
    pub base_url: String,
    pub report_keyword: String,
}

/// Task state reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    /// Any other value, including a missing `status` field.
    Unknown(String),
}

impl TaskState {
    fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// One decoded poll response.
#[derive(Debug, Clone)]
pub struct TaskPoll {
    pub state: TaskState,
    /// `result.test.report_url`; the literal "None" counts as absent.
    pub report_url: Option<String>,
    /// `error` field, empty when absent.
    pub error: String,
    /// Verbatim response body.
    pub raw: String,
}

impl TaskPoll {
    pub fn parse(body: &str) -> Result<Self, PollError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| PollError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(PollError::Malformed("expected a JSON object".to_string()));
        }

        let state = TaskState::parse(value.get("status").and_then(Value::as_str).unwrap_or(""));
        let report_url = value
            .pointer("/result/test/report_url")
            .or_else(|| value.pointer("/result/report_url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty() && *url != "None")
            .map(str::to_string);
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            state,
            report_url,
            error,
            raw: body.to_string(),
        })
    }
}

/// Client for one external test service base URL.
#[derive(Clone)]
pub struct ExternalTestService {
    base_url: String,
    gateway: Arc<dyn HttpGateway>,
}

impl ExternalTestService {
    pub fn new(base_url: impl Into<String>, gateway: Arc<dyn HttpGateway>) -> Self {
        Self {
            base_url: base_url.into(),
            gateway,
        }
    }

    /// Start a deploy-and-test task; returns its task id.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<String, DispatchError> {
        let body =
            serde_json::to_value(request).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        let url = join_url(&self.base_url, "api/deploy_and_test");
        let response = self
            .gateway
            .send(GatewayRequest::post_json(url, body, timeout))
            .await?;

        if !response.is_ok() {
            return Err(DispatchError::Status {
                status: response.status,
                body: excerpt(&response.body),
            });
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| DispatchError::Malformed(e.to_string()))?;
        value
            .get("task_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(DispatchError::MissingTaskId)
    }

    /// Query a task once.
    pub async fn poll(&self, task_id: &str, timeout: Duration) -> Result<TaskPoll, PollError> {
        let url = join_url(&self.base_url, &format!("api/tasks/{}", task_id));
        let response = self.gateway.send(GatewayRequest::get(url, timeout)).await?;

        if !response.is_ok() {
            return Err(PollError::Status(response.status));
        }
        TaskPoll::parse(&response.body)
    }
}
