//! Test item entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub associated_parameter_set_id: Option<Uuid>,
    pub notification_enabled: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::parameter_set::Entity",
        from = "Column::AssociatedParameterSetId",
        to = "super::parameter_set::Column::Id",
        on_delete = "SetNull"
    )]
    ParameterSet,
    #[sea_orm(has_many = "super::deploy_test_run::Entity")]
    DeployTestRuns,
}

impl Related<super::parameter_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ParameterSet.def()
    }
}

impl Related<super::deploy_test_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeployTestRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
