//! Migration: Create deploy_test_runs table.
//!
//! One row per pipeline execution. The step log lives in a JSONB column.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE deploy_test_runs (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    test_item_id UUID NOT NULL REFERENCES test_items(id) ON DELETE CASCADE,
                    build_artifact_id UUID NOT NULL REFERENCES build_artifacts(id) ON DELETE CASCADE,
                    parameter_set_id UUID REFERENCES parameter_sets(id) ON DELETE SET NULL,
                    triggered_by VARCHAR(255) NOT NULL,

                    status VARCHAR(20) NOT NULL DEFAULT 'PENDING'
                        CHECK (status IN ('PENDING', 'DOWNLOADING', 'DOWNLOADED', 'TESTING',
                                          'MONITORING', 'COMPLETED', 'DEPLOY_COMPLETE', 'FAILED')),

                    download_url TEXT,
                    download_path TEXT,
                    task_id VARCHAR(255),
                    report_url TEXT,

                    parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
                    steps JSONB NOT NULL DEFAULT '[]'::jsonb,

                    -- Polling policy, fixed at creation
                    max_query_hours INTEGER NOT NULL DEFAULT 3 CHECK (max_query_hours > 0),
                    query_interval_seconds INTEGER NOT NULL DEFAULT 60 CHECK (query_interval_seconds > 0),
                    query_timeout_seconds INTEGER NOT NULL DEFAULT 30 CHECK (query_timeout_seconds > 0),

                    started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    finished_at TIMESTAMPTZ,
                    error_message TEXT,
                    response_raw_data TEXT,

                    -- finished_at is set exactly when the run is terminal
                    CONSTRAINT chk_deploy_test_runs_finished CHECK (
                        (status IN ('COMPLETED', 'DEPLOY_COMPLETE', 'FAILED')) = (finished_at IS NOT NULL)
                    )
                );

                CREATE INDEX idx_deploy_test_runs_test_item ON deploy_test_runs(test_item_id, started_at DESC);
                CREATE INDEX idx_deploy_test_runs_started_at ON deploy_test_runs(started_at DESC);

                -- Index for the processing count (active runs only)
                CREATE INDEX idx_deploy_test_runs_active ON deploy_test_runs(status)
                    WHERE status NOT IN ('COMPLETED', 'DEPLOY_COMPLETE', 'FAILED');
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS deploy_test_runs CASCADE;")
            .await?;

        Ok(())
    }
}
