//! Run outcome notifications.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Project name used when the `project_name` setting is empty.
pub const DEFAULT_PROJECT_NAME: &str = "CRAT";

/// Timeout for webhook deliveries.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Who to tell about which run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub recipient: String,
    pub test_name: String,
    /// `"{job_name} #{build_number}"`
    pub build_label: String,
    /// Link to the build page, when a build info base URL is configured.
    pub build_url: Option<String>,
    pub project_name: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, notice: &Notice, report_url: Option<&str>)
    -> Result<(), NotifyError>;

    async fn notify_failure(&self, notice: &Notice, error_message: &str)
    -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_success(
        &self,
        notice: &Notice,
        report_url: Option<&str>,
    ) -> Result<(), NotifyError> {
        info!(
            recipient = %notice.recipient,
            test_name = %notice.test_name,
            build = %notice.build_label,
            report_url = report_url.unwrap_or("-"),
            "[{}] Test succeeded",
            notice.project_name
        );
        Ok(())
    }

    async fn notify_failure(&self, notice: &Notice, error_message: &str) -> Result<(), NotifyError> {
        info!(
            recipient = %notice.recipient,
            test_name = %notice.test_name,
            build = %notice.build_label,
            error = error_message,
            "[{}] Test failed",
            notice.project_name
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Success,
    Failure,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    outcome: Outcome,
    #[serde(flatten)]
    notice: &'a Notice,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

/// Posts notifications as JSON to a webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError(format!("webhook returned {}", status.as_u16())));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_success(
        &self,
        notice: &Notice,
        report_url: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.post(&WebhookPayload {
            outcome: Outcome::Success,
            notice,
            report_url,
            error_message: None,
        })
        .await
    }

    async fn notify_failure(&self, notice: &Notice, error_message: &str) -> Result<(), NotifyError> {
        self.post(&WebhookPayload {
            outcome: Outcome::Failure,
            notice,
            report_url: None,
            error_message: Some(error_message),
        })
        .await
    }
}
