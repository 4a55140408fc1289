//! Read-only catalog records consumed by the pipeline.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Name of the parameter set used when nothing more specific applies.
pub const DEFAULT_PARAMETER_SET: &str = "default";

/// Upgrade type sent when the resolved parameters leave it empty.
pub const DEFAULT_UPGRADE_TYPE: &str = "full";

/// `test_path` value that marks a deploy-only run.
pub const DEPLOY_ONLY_TEST_PATH: &str = "deploy";

/// Setting keys read by the pipeline.
pub mod setting_keys {
    pub const PACKAGE_DOWNLOAD_BASE_URL: &str = "package_download_base_url";
    pub const EXTERNAL_TEST_SERVER_URL: &str = "external_test_server_url";
    pub const PACKAGE_BUILD_INFO_BASE_URL: &str = "package_build_info_base_url";
    pub const PROJECT_NAME: &str = "project_name";
}

/// A named deploy target.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TestItem {
    pub id: Uuid,
    pub name: String,
    pub associated_parameter_set_id: Option<Uuid>,
    pub notification_enabled: bool,
}

/// Reference to a built package.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BuildArtifact {
    pub id: Uuid,
    pub job_name: String,
    pub build_number: i32,
    /// Directory of the package, relative to the download base URL
    pub package_path: String,
    pub build_user: Option<String>,
}

impl BuildArtifact {
    /// Human-readable label, e.g. `core-nightly #42`.
    pub fn label(&self) -> String {
        format!("{} #{}", self.job_name, self.build_number)
    }
}

/// Named bundle of test parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub id: Uuid,
    pub name: String,
    pub parameters: TestParameters,
}

/// Parameters forwarded to the external test service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TestParameters {
    pub service_name: String,
    pub install_dir: String,
    pub upgrade_type: String,
    pub test_path: String,
    pub base_url: String,
    pub report_keyword: String,
}

impl TestParameters {
    /// Deploy-only runs skip the report and the notification.
    pub fn is_deploy_only(&self) -> bool {
        self.test_path == DEPLOY_ONLY_TEST_PATH
    }
}

/// Settings captured once when a run is triggered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSettings {
    pub download_base_url: Option<String>,
    pub test_server_url: Option<String>,
    pub build_info_base_url: Option<String>,
    pub project_name: Option<String>,
}

/// Join a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_label() {
        let artifact = BuildArtifact {
            id: Uuid::now_v7(),
            job_name: "core-nightly".to_string(),
            build_number: 42,
            package_path: "CDN/Core/".to_string(),
            build_user: None,
        };
        assert_eq!(artifact.label(), "core-nightly #42");
    }

    #[test]
    fn test_parameters_tolerate_missing_fields() {
        let params: TestParameters =
            serde_json::from_value(serde_json::json!({"test_path": "deploy"})).unwrap();
        assert!(params.is_deploy_only());
        assert!(params.service_name.is_empty());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://m/", "/CDN/x/"), "http://m/CDN/x/");
        assert_eq!(join_url("http://m", "api/tasks/1"), "http://m/api/tasks/1");
    }
}
