//! Polling loop for an external test task.

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::external::{ExternalTestService, TaskState};
use crate::models::PollPolicy;

/// How a monitored task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Tests finished; the report URL may still be absent.
    Completed {
        report_url: Option<String>,
        raw: String,
    },
    /// Deploy-only run finished.
    DeployComplete { raw: String },
    /// The service reported a failure.
    Failed { error: String, raw: String },
    /// No terminal status within the polling budget.
    TimedOut { hours: i32 },
}

/// Poll `task_id` until it reaches a terminal state or the budget runs out.
///
/// Transport errors, non-200 answers, malformed bodies and unrecognised
/// statuses are all retried after the poll interval.
pub async fn monitor_task(
    service: &ExternalTestService,
    task_id: &str,
    policy: &PollPolicy,
    deploy_only: bool,
) -> MonitorOutcome {
    let started = Instant::now();
    let budget = policy.budget();
    let mut attempt: u64 = 0;

    loop {
        if started.elapsed() > budget {
            warn!(task_id, hours = policy.max_query_hours, "Monitoring budget exhausted");
            return MonitorOutcome::TimedOut {
                hours: policy.max_query_hours,
            };
        }

        attempt += 1;
        match service.poll(task_id, policy.timeout()).await {
            Ok(poll) => {
                debug!(task_id, attempt, state = ?poll.state, "Polled task");
                match poll.state {
                    TaskState::Completed if deploy_only => {
                        info!(task_id, "Deploy-only task completed");
                        return MonitorOutcome::DeployComplete { raw: poll.raw };
                    }
                    TaskState::Completed => {
                        info!(task_id, report_url = ?poll.report_url, "Task completed");
                        return MonitorOutcome::Completed {
                            report_url: poll.report_url,
                            raw: poll.raw,
                        };
                    }
                    TaskState::Failed => {
                        warn!(task_id, error = %poll.error, "Task failed");
                        return MonitorOutcome::Failed {
                            error: poll.error,
                            raw: poll.raw,
                        };
                    }
                    TaskState::Pending | TaskState::Running => {}
                    TaskState::Unknown(status) => {
                        warn!(task_id, status = %status, "Unknown task status");
                    }
                }
            }
            Err(e) => warn!(task_id, attempt, error = %e, "Task poll failed, retrying"),
        }

        sleep(policy.interval()).await;
    }
}
