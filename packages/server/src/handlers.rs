//! HTTP handler functions for the land-audit API.

use actix_web::{HttpResponse, web};
use land_audit_assess::AssessError;
use land_audit_backend::BackendError;

use crate::AppState;

/// `GET /`
pub async fn home() -> HttpResponse {
    HttpResponse::Ok().body("Welcome to the Land Audit API!")
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /check-deforestation`
///
/// Body: a GeoJSON `FeatureCollection` whose first feature's geometry is
/// the ROI. Returns the full multi-criterion assessment, or a structured
/// error payload.
pub async fn check_deforestation(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    match state.assessor.assess(&body).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => error_response(&e),
    }
}

/// Maps pipeline errors to status codes: validation 4xx, backend and
/// timeout 5xx. Partial results are never produced upstream, so every
/// error path is a plain `{"error": message}` payload.
fn error_response(error: &AssessError) -> HttpResponse {
    let body = serde_json::json!({ "error": error.to_string() });
    match error {
        AssessError::InvalidInput(_) => HttpResponse::BadRequest().json(body),
        AssessError::Timeout => HttpResponse::GatewayTimeout().json(body),
        AssessError::Backend(BackendError::Unavailable(e)) => {
            log::error!("backend unavailable: {e}");
            HttpResponse::BadGateway().json(body)
        }
        AssessError::Backend(e) => {
            log::error!("backend rejected assessment: {e}");
            HttpResponse::InternalServerError().json(body)
        }
        AssessError::InvalidConfig { message } => {
            log::error!("deployment configuration unusable: {message}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}
