//! Leaf identification endpoint.

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::vision::predictor::DEFAULT_TOP_K;
use crate::pipeline::vision::PredictionResult;

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// `POST /api/identify`: classify an uploaded leaf photo.
///
/// Pipeline failures (undecodable image, no plant found) are returned as
/// 200 with `success: false`, the same shape the web client renders.
pub async fn identify(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let predictor = ctx.core.predictor().ok_or(ApiError::ModelNotLoaded)?;
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        tracing::info!(filename = %filename, size = bytes.len(), "Leaf image received");
        image = Some(bytes);
        break;
    }

    let bytes = image.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing `{FILE_FIELD}` field in multipart body"))
    })?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    let result =
        tokio::task::spawn_blocking(move || predictor.predict_leaf(&bytes, DEFAULT_TOP_K)).await?;

    Ok(Json(result))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
