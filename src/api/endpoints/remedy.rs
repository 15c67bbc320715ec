//! Symptom remedy endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::rag::sanitize::sanitize_query;

#[derive(Debug, Deserialize)]
pub struct RemedyRequest {
    pub symptoms: String,
}

#[derive(Debug, Serialize)]
pub struct RemedyResponse {
    pub response: String,
}

/// `POST /api/remedy`: answer a symptom description from the knowledge base.
pub async fn remedy(
    State(ctx): State<ApiContext>,
    payload: Result<Json<RemedyRequest>, JsonRejection>,
) -> Result<Json<RemedyResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let symptoms = sanitize_query(&request.symptoms)?;

    let engine = ctx.core.remedy().ok_or_else(|| {
        ApiError::RemedyUnavailable(
            "Remedy assistant is not configured on this server".into(),
        )
    })?;

    let response = tokio::task::spawn_blocking(move || engine.answer(&symptoms)).await??;

    Ok(Json(RemedyResponse { response }))
}
