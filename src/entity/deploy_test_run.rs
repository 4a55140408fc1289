//! Deploy-test run entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deploy_test_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub test_item_id: Uuid,
    pub build_artifact_id: Uuid,
    pub parameter_set_id: Option<Uuid>,
    pub triggered_by: String,
    /// PENDING, DOWNLOADING, DOWNLOADED, TESTING, MONITORING, COMPLETED, DEPLOY_COMPLETE, FAILED
    pub status: String,
    pub download_url: Option<String>,
    pub download_path: Option<String>,
    pub task_id: Option<String>,
    pub report_url: Option<String>,
    /// Resolved test parameters
    #[sea_orm(column_type = "JsonBinary")]
    pub parameters: JsonValue,
    /// Step log: [{name, status, start_time, end_time?, details?, error?}]
    #[sea_orm(column_type = "JsonBinary")]
    pub steps: JsonValue,
    pub max_query_hours: i32,
    pub query_interval_seconds: i32,
    pub query_timeout_seconds: i32,
    pub started_at: DateTimeUtc,
    pub finished_at: Option<DateTimeUtc>,
    pub error_message: Option<String>,
    pub response_raw_data: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_item::Entity",
        from = "Column::TestItemId",
        to = "super::test_item::Column::Id",
        on_delete = "Cascade"
    )]
    TestItem,
    #[sea_orm(
        belongs_to = "super::build_artifact::Entity",
        from = "Column::BuildArtifactId",
        to = "super::build_artifact::Column::Id",
        on_delete = "Cascade"
    )]
    BuildArtifact,
}

impl Related<super::test_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestItem.def()
    }
}

impl Related<super::build_artifact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BuildArtifact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
