//! Database queries for catalog records.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entity::build_artifact::{self, Entity as BuildArtifactEntity};
use crate::entity::parameter_set::{self, Entity as ParameterSetEntity};
use crate::entity::system_setting::Entity as SystemSetting;
use crate::entity::test_item::{self, Entity as TestItemEntity};
use crate::error::{AppError, AppResult};
use crate::models::{BuildArtifact, ParameterSet, TestItem, TestParameters};
use crate::store::Catalog;

use super::DbPool;

impl From<test_item::Model> for TestItem {
    fn from(model: test_item::Model) -> Self {
        TestItem {
            id: model.id,
            name: model.name,
            associated_parameter_set_id: model.associated_parameter_set_id,
            notification_enabled: model.notification_enabled,
        }
    }
}

impl From<build_artifact::Model> for BuildArtifact {
    fn from(model: build_artifact::Model) -> Self {
        BuildArtifact {
            id: model.id,
            job_name: model.job_name,
            build_number: model.build_number,
            package_path: model.package_path,
            build_user: model.build_user,
        }
    }
}

impl TryFrom<parameter_set::Model> for ParameterSet {
    type Error = AppError;

    fn try_from(model: parameter_set::Model) -> Result<Self, Self::Error> {
        let parameters: TestParameters =
            serde_json::from_value(model.parameters).map_err(|e| {
                AppError::InvalidFormat(format!("Parameter set '{}': {}", model.name, e))
            })?;

        Ok(ParameterSet {
            id: model.id,
            name: model.name,
            parameters,
        })
    }
}

#[async_trait]
impl Catalog for DbPool {
    async fn get_test_item(&self, id: Uuid) -> AppResult<Option<TestItem>> {
        let result = TestItemEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test item: {}", e)))?;

        Ok(result.map(TestItem::from))
    }

    async fn get_build_artifact(&self, id: Uuid) -> AppResult<Option<BuildArtifact>> {
        let result = BuildArtifactEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get build artifact: {}", e)))?;

        Ok(result.map(BuildArtifact::from))
    }

    async fn get_parameter_set(&self, id: Uuid) -> AppResult<Option<ParameterSet>> {
        let result = ParameterSetEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get parameter set: {}", e)))?;

        result.map(ParameterSet::try_from).transpose()
    }

    async fn find_parameter_set_by_name(&self, name: &str) -> AppResult<Option<ParameterSet>> {
        let result = ParameterSetEntity::find()
            .filter(parameter_set::Column::Name.eq(name))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find parameter set: {}", e)))?;

        result.map(ParameterSet::try_from).transpose()
    }

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        let result = SystemSetting::find_by_id(key.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get setting '{}': {}", key, e)))?;

        Ok(result.map(|s| s.value).filter(|v| !v.is_empty()))
    }
}
