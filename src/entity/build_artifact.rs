//! Build artifact entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "build_artifacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_name: String,
    pub build_number: i32,
    /// Package directory relative to `package_download_base_url`
    pub package_path: String,
    pub build_user: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub raw_data: Option<JsonValue>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::deploy_test_run::Entity")]
    DeployTestRuns,
}

impl Related<super::deploy_test_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeployTestRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
