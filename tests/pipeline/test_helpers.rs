//! Shared test helpers for pipeline tests.

use actix_web::dev::{Service, ServiceResponse};
use actix_web::{App, Error, test, web};
use async_trait::async_trait;
use crat_lib::api;
use crat_lib::config::{PipelineSettings, USER_HEADER};
use crat_lib::models::{
    BuildArtifact, DeployTestRun, ParameterSet, PollPolicy, TestItem, TestParameters,
    setting_keys,
};
use crat_lib::services::notifier::{Notice, NotifyError};
use crat_lib::services::{DeployTestService, HttpGateway, Notifier, ReqwestGateway};
use crat_lib::store::MemoryStore;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use super::mock_services::{MockServices, MockState};

/// User header value used in tests.
pub const TEST_USER: &str = "qa@example.com";

/// Notifier that remembers every call.
#[derive(Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<(Notice, Option<String>)>>,
    pub failures: Mutex<Vec<(Notice, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_success(
        &self,
        notice: &Notice,
        report_url: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.successes
            .lock()
            .unwrap()
            .push((notice.clone(), report_url.map(str::to_string)));
        Ok(())
    }

    async fn notify_failure(&self, notice: &Notice, error_message: &str) -> Result<(), NotifyError> {
        self.failures
            .lock()
            .unwrap()
            .push((notice.clone(), error_message.to_string()));
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }
}

/// Everything one test needs: mock upstreams, a seeded store and the service.
pub struct TestEnv {
    pub mock: MockServices,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: DeployTestService,
    pub item: TestItem,
    pub artifact: BuildArtifact,
    pub settings: PipelineSettings,
    pub download_dir: TempDir,
}

/// Fast polling so monitoring finishes within a couple of seconds.
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        max_query_hours: 1,
        query_interval_seconds: 1,
        query_timeout_seconds: 5,
    }
}

/// Start the mock and seed a test item "cds", build "core #12" and a
/// "default" parameter set.
pub async fn setup(mock_state: MockState) -> TestEnv {
    setup_with_parameters(mock_state, TestParameters::default()).await
}

pub async fn setup_with_parameters(mock_state: MockState, parameters: TestParameters) -> TestEnv {
    let mock = MockServices::start(mock_state).await;
    let store = Arc::new(MemoryStore::new());

    let default_set = ParameterSet {
        id: Uuid::now_v7(),
        name: "default".to_string(),
        parameters: TestParameters {
            install_dir: "/opt/cds".to_string(),
            base_url: "http://cds.test.local".to_string(),
            ..parameters
        },
    };
    let item = TestItem {
        id: Uuid::now_v7(),
        name: "cds".to_string(),
        associated_parameter_set_id: None,
        notification_enabled: true,
    };
    let artifact = BuildArtifact {
        id: Uuid::now_v7(),
        job_name: "core".to_string(),
        build_number: 12,
        package_path: "core/12/".to_string(),
        build_user: Some("builder@example.com".to_string()),
    };

    store.insert_parameter_set(default_set).unwrap();
    store.insert_test_item(item.clone()).unwrap();
    store.insert_build_artifact(artifact.clone()).unwrap();
    store
        .set_setting(setting_keys::PACKAGE_DOWNLOAD_BASE_URL, &mock.packages_url())
        .unwrap();
    store
        .set_setting(setting_keys::EXTERNAL_TEST_SERVER_URL, &mock.base_url)
        .unwrap();
    store
        .set_setting(setting_keys::PACKAGE_BUILD_INFO_BASE_URL, "http://ci.local/job/")
        .unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    let settings = PipelineSettings {
        download_dir: download_dir.path().to_path_buf(),
        fetch_timeout: Duration::from_secs(10),
        dispatch_timeout: Duration::from_secs(10),
        poll_defaults: fast_policy(),
    };

    let notifier = Arc::new(RecordingNotifier::default());
    let service = DeployTestService::new(
        store.clone(),
        store.clone(),
        Arc::new(ReqwestGateway::new().unwrap()),
        notifier.clone(),
        reqwest::Client::new(),
        settings.clone(),
    );

    TestEnv {
        mock,
        store,
        notifier,
        service,
        item,
        artifact,
        settings,
        download_dir,
    }
}

impl TestEnv {
    pub async fn trigger(&self) -> DeployTestRun {
        self.service
            .trigger(self.item.id, self.artifact.id, TEST_USER, None)
            .await
            .expect("trigger should succeed")
    }

    /// Swap the gateway to the external test service, keeping everything else.
    pub fn with_gateway(mut self, gateway: Arc<dyn HttpGateway>) -> Self {
        self.service = DeployTestService::new(
            self.store.clone(),
            self.store.clone(),
            gateway,
            self.notifier.clone(),
            reqwest::Client::new(),
            self.settings.clone(),
        );
        self
    }
}

/// Poll the run until it reaches a terminal status.
pub async fn wait_for_terminal(service: &DeployTestService, run_id: Uuid) -> DeployTestRun {
    for _ in 0..300 {
        let run = service.get_run(run_id).await.unwrap();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run {} did not finish in time", run_id);
}

/// Create the HTTP app around a service.
pub async fn create_test_app(
    service: &DeployTestService,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = Error> {
    test::init_service(
        App::new().app_data(web::Data::new(service.clone())).service(
            web::scope("/api/v1").configure(api::configure_deploy_routes),
        ),
    )
    .await
}

/// Send a request and decode the JSON body.
pub async fn call_json<S>(app: &S, req: test::TestRequest) -> (u16, Value)
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = Error>,
{
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body = test::read_body(resp).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

pub fn with_user(req: test::TestRequest) -> test::TestRequest {
    req.insert_header((USER_HEADER, TEST_USER))
}
