//! API endpoint modules.

pub mod deploy_runs;
pub mod health;
pub mod openapi;

pub use deploy_runs::configure_routes as configure_deploy_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
