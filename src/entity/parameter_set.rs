//! Parameter set entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "parameter_sets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    /// Test parameters: {service_name, install_dir, upgrade_type, test_path, base_url, report_keyword}
    #[sea_orm(column_type = "JsonBinary")]
    pub parameters: JsonValue,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::test_item::Entity")]
    TestItems,
}

impl Related<super::test_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
