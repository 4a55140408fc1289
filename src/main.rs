//! CRAT deploy-test server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crat_lib::api::{self, ApiDoc};
use crat_lib::config::{Config, USER_HEADER};
use crat_lib::db::DbPool;
use crat_lib::middleware;
use crat_lib::services::{
    self, DeployTestService, HttpGateway, LogNotifier, Notifier, ReqwestGateway, WebhookNotifier,
};
use crat_lib::store::{Catalog, RunStore};

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| io_error("Failed to set tracing subscriber", e))?;

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set");
            error!("  - CRAT_* numeric settings must be positive integers");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  CRAT Deploy Test Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development default for DATABASE_URL");
    }

    tokio::fs::create_dir_all(&config.pipeline.download_dir)
        .await
        .map_err(|e| io_error("Failed to create download directory", e))?;

    let pool = DbPool::new(&config)
        .await
        .map_err(|e| io_error("Failed to initialize database", e))?;
    info!("Database connection established");

    pool.run_migrations()
        .await
        .map_err(|e| io_error("Failed to run migrations", e))?;
    info!("Database migrations complete");

    let pool = Arc::new(pool);
    let runs: Arc<dyn RunStore> = pool.clone();
    let catalog: Arc<dyn Catalog> = pool.clone();

    let http_client = services::gateway::build_client()
        .map_err(|e| io_error("Failed to build HTTP client", e))?;
    let gateway: Arc<dyn HttpGateway> = Arc::new(ReqwestGateway::with_client(http_client.clone()));
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Notifications delivered to webhook {}", url);
            Arc::new(WebhookNotifier::new(http_client.clone(), url.clone()))
        }
        None => {
            info!("No notification webhook configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let deploy_service = DeployTestService::new(
        runs.clone(),
        catalog,
        gateway,
        notifier,
        http_client,
        config.pipeline.clone(),
    );

    let cleanup_config = services::CleanupConfig {
        download_dir: config.pipeline.download_dir.clone(),
        retention_hours: config.artifact_retention_hours,
        interval_secs: if config.is_development() { 60 } else { 3600 }, // 1 min dev, 1 hour prod
    };
    services::start_cleanup_task(runs, cleanup_config);
    info!(
        "Cleanup service started (package retention: {} hours)",
        config.artifact_retention_hours
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let user_header = HeaderName::from_bytes(USER_HEADER.as_bytes())
        .map_err(|e| io_error("Invalid user header name", e))?;

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let openapi = ApiDoc::openapi();
    let pool_data = web::Data::from(pool);
    let service_data = web::Data::new(deploy_service);

    let server = HttpServer::new(move || {
        let allowed_headers = vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            user_header.clone(),
        ];
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(pool_data.clone())
            .app_data(service_data.clone())
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_deploy_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
