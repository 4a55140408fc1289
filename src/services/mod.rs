//! Business logic services.

pub mod cleanup;
pub mod external;
pub mod fetcher;
pub mod gateway;
pub mod locator;
pub mod monitor;
pub mod notifier;
pub mod orchestrator;
pub mod params;

pub use cleanup::{CleanupConfig, start_cleanup_task};
pub use fetcher::ArtifactFetcher;
pub use gateway::{HttpGateway, ReqwestGateway};
pub use locator::ArtifactLocator;
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use orchestrator::DeployTestService;
