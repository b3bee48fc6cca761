#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the land-audit risk-assessment service.
//!
//! Hosts the [`Assessor`] pipeline behind `POST /check-deforestation`:
//! the request body is a GeoJSON `FeatureCollection`, the response the
//! multi-criterion [`land_audit_assess_models::AssessmentResult`]. The
//! server owns the backend adapter's lifecycle — it is constructed from
//! env already authenticated before any pipeline call.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use land_audit_assess::Assessor;
use land_audit_assess::config::AssessConfig;
use land_audit_backend::remote::RemoteBackend;

/// Shared application state.
pub struct AppState {
    /// The assessment pipeline, stateless across requests.
    pub assessor: Arc<Assessor>,
}

/// Starts the land-audit API server.
///
/// Reads the backend endpoint and token from
/// `LAND_AUDIT_BACKEND_URL`/`LAND_AUDIT_BACKEND_TOKEN`, the optional
/// pipeline configuration file from `LAND_AUDIT_CONFIG`, and the bind
/// address from `BIND_ADDR`/`PORT`. This is a regular async function —
/// the caller provides the runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if `LAND_AUDIT_BACKEND_URL` is unset or the configuration
/// file cannot be loaded.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let backend_url = std::env::var("LAND_AUDIT_BACKEND_URL")
        .expect("LAND_AUDIT_BACKEND_URL environment variable not set");
    let backend_token = std::env::var("LAND_AUDIT_BACKEND_TOKEN").unwrap_or_default();

    let config = match std::env::var("LAND_AUDIT_CONFIG") {
        Ok(path) => {
            log::info!("Loading pipeline config from {path}");
            AssessConfig::load(std::path::Path::new(&path)).expect("Failed to load pipeline config")
        }
        Err(_) => AssessConfig::default(),
    };

    log::info!(
        "Using {} change-detection strategy against {backend_url}",
        config.deforestation.strategy
    );
    let backend = Arc::new(RemoteBackend::new(&backend_url, &backend_token));
    let state = web::Data::new(AppState {
        assessor: Arc::new(Assessor::new(backend, config)),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .route("/", web::get().to(handlers::home))
            .route(
                "/check-deforestation",
                web::post().to(handlers::check_deforestation),
            )
            .service(web::scope("/api").route("/health", web::get().to(handlers::health)))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
