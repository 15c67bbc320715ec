//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub classifier_loaded: bool,
    pub remedy_loaded: bool,
    pub version: &'static str,
}

/// `GET /api/health`: liveness plus which components loaded.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        classifier_loaded: ctx.core.classifier_loaded(),
        remedy_loaded: ctx.core.remedy_loaded(),
        version: crate::config::APP_VERSION,
    })
}
