//! Migration: Create catalog tables.
//!
//! Parameter sets, test items, build artifacts and system settings read by the
//! deploy-test pipeline.

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
                -- Shared trigger function for updated_at
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE parameter_sets (
                    id UUID PRIMARY KEY,
                    name VARCHAR(100) NOT NULL UNIQUE,
                    description TEXT,

                    -- {service_name, install_dir, upgrade_type, test_path, base_url, report_keyword}
                    parameters JSONB NOT NULL DEFAULT '{}'::jsonb,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TABLE test_items (
                    id UUID PRIMARY KEY,
                    name VARCHAR(100) NOT NULL UNIQUE,
                    description TEXT,
                    associated_parameter_set_id UUID REFERENCES parameter_sets(id) ON DELETE SET NULL,
                    notification_enabled BOOLEAN NOT NULL DEFAULT FALSE,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TABLE build_artifacts (
                    id UUID PRIMARY KEY,
                    job_name VARCHAR(255) NOT NULL,
                    build_number INTEGER NOT NULL,

                    -- Directory relative to package_download_base_url, e.g. CDN/Core/20240626-story/
                    package_path VARCHAR(1000) NOT NULL,
                    build_user VARCHAR(255),
                    raw_data JSONB,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_build_artifacts_job_name ON build_artifacts(job_name);
                CREATE INDEX idx_build_artifacts_created_at ON build_artifacts(created_at DESC);

                CREATE TABLE system_settings (
                    key VARCHAR(100) PRIMARY KEY,
                    value TEXT NOT NULL DEFAULT '',
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TRIGGER update_parameter_sets_updated_at
                    BEFORE UPDATE ON parameter_sets
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();

                CREATE TRIGGER update_test_items_updated_at
                    BEFORE UPDATE ON test_items
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();

                CREATE TRIGGER update_system_settings_updated_at
                    BEFORE UPDATE ON system_settings
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TABLE IF EXISTS system_settings CASCADE;
                DROP TABLE IF EXISTS build_artifacts CASCADE;
                DROP TABLE IF EXISTS test_items CASCADE;
                DROP TABLE IF EXISTS parameter_sets CASCADE;
                DROP FUNCTION IF EXISTS update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }
}
