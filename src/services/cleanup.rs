//! Cleanup service for deleting downloaded packages of finished runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::RunStore;

/// Configuration for the cleanup service.
#[derive(Clone)]
pub struct CleanupConfig {
    /// Root directory holding one sub-directory per run
    pub download_dir: PathBuf,
    /// Hours a finished run keeps its package
    pub retention_hours: u64,
    /// How often to run cleanup (in seconds)
    pub interval_secs: u64,
}

/// Outcome of one cleanup cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted: usize,
    pub errors: usize,
}

/// Start the cleanup background task.
///
/// This spawns a tokio task that periodically deletes run directories whose
/// run is gone or finished longer ago than the retention period.
pub fn start_cleanup_task(runs: Arc<dyn RunStore>, config: CleanupConfig) {
    tokio::spawn(async move {
        info!(
            "Starting cleanup service (retention: {} hours, interval: {} seconds)",
            config.retention_hours, config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs));

        loop {
            ticker.tick().await;

            if let Err(e) = run_cleanup(runs.as_ref(), &config).await {
                error!("Cleanup task error: {}", e);
            }
        }
    });
}

/// Run a single cleanup cycle.
pub async fn run_cleanup(runs: &dyn RunStore, config: &CleanupConfig) -> AppResult<CleanupStats> {
    let mut stats = CleanupStats::default();

    let mut entries = match tokio::fs::read_dir(&config.download_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(e.into()),
    };

    let cutoff = i64::try_from(config.retention_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|retention| Utc::now().checked_sub_signed(retention))
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "retention of {} hours is out of range",
                config.retention_hours
            ))
        })?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let Some(run_id) = entry
            .file_name()
            .to_str()
            .and_then(|name| Uuid::parse_str(name).ok())
        else {
            continue;
        };

        let expired = match runs.get_run(run_id).await? {
            None => true,
            Some(run) => {
                run.status.is_terminal() && run.finished_at.is_some_and(|at| at < cutoff)
            }
        };
        if !expired {
            continue;
        }

        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => {
                info!("Deleted package directory for run {}", run_id);
                stats.deleted += 1;
            }
            Err(e) => {
                warn!("Failed to delete package directory for run {}: {}", run_id, e);
                stats.errors += 1;
            }
        }
    }

    if stats.deleted > 0 || stats.errors > 0 {
        info!(
            "Package cleanup: {} deleted, {} errors",
            stats.deleted, stats.errors
        );
    }

    Ok(stats)
}
