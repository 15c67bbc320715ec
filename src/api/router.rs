//! HTTP API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Layers (outermost → innermost): CORS → request tracing → handler.
//! `/api/identify` additionally carries the upload body limit.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::{ApiContext, MAX_UPLOAD_BYTES};
use crate::core_state::CoreState;

/// Build the API router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let cors = cors_layer(&core.config.cors_origin);
    let ctx = ApiContext::new(core);

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/identify",
            post(endpoints::identify::identify).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/remedy", post(endpoints::remedy::remedy))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS for the web client.
///
/// `origins` is a comma-separated list of exact origins. `*` allows any
/// origin without credentials; credentialed requests need explicit origins.
pub fn cors_layer(origins: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    if origins.trim() == "*" {
        return base.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origin configured; cross-origin requests will be refused");
        return base;
    }

    base.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::pipeline::rag::{GenerationSettings, MockChatClient, RemedyEngine};
    use crate::pipeline::storage::{
        ingest::ingest_text, MockEmbedder, PassageChunker, SqliteVectorStore,
    };
    use crate::pipeline::vision::labels::default_labels;
    use crate::pipeline::vision::{
        LeafPreprocessor, MedicinalLeafPredictor, MockLeafClassifier, NoOpBackgroundRemover,
        PreprocessConfig,
    };

    const BOUNDARY: &str = "swasth-test-boundary";

    fn predictor(winner: usize) -> Arc<MedicinalLeafPredictor> {
        let preprocessor =
            LeafPreprocessor::new(Box::new(NoOpBackgroundRemover), PreprocessConfig::default());
        let classifier = MockLeafClassifier::one_hot(default_labels().len(), winner);
        Arc::new(
            MedicinalLeafPredictor::new(preprocessor, Box::new(classifier), default_labels())
                .unwrap(),
        )
    }

    fn remedy_engine(reply: &str) -> Arc<RemedyEngine> {
        let embedder = MockEmbedder::new();
        let store = SqliteVectorStore::in_memory().unwrap();
        ingest_text(
            "remedies.md",
            "## Cough\n\nTulsi and ginger tea relieves cough and cold.",
            &PassageChunker::new(),
            &embedder,
            &store,
        )
        .unwrap();
        Arc::new(RemedyEngine::new(
            Box::new(embedder),
            Box::new(store),
            Box::new(MockChatClient::new(reply)),
            GenerationSettings::default(),
        ))
    }

    fn app(
        predictor: Option<Arc<MedicinalLeafPredictor>>,
        remedy: Option<Arc<RemedyEngine>>,
    ) -> Router {
        api_router(Arc::new(CoreState::new(AppConfig::default(), predictor, remedy)))
    }

    fn leaf_png() -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(120, 80, Rgba([0, 0, 0, 0]));
        for y in 20..60 {
            for x in 30..90 {
                img.put_pixel(x, y, Rgba([40, 160, 60, 255]));
            }
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn identify_request(body: Vec<u8>) -> Request<Body> {
        Request::post("/api/identify")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn remedy_request(json: serde_json::Value) -> Request<Body> {
        Request::post("/api/remedy")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 65536)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_loaded_components() {
        let response = app(Some(predictor(0)), None)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classifier_loaded"], true);
        assert_eq!(json["remedy_loaded"], false);
        assert_eq!(json["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = app(None, None)
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn identify_without_model_is_503() {
        let response = app(None, None)
            .oneshot(identify_request(multipart_body("file", "leaf.png", &leaf_png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "MODEL_NOT_LOADED");
    }

    #[tokio::test]
    async fn identify_without_file_field_is_400() {
        let response = app(Some(predictor(0)), None)
            .oneshot(identify_request(multipart_body("photo", "leaf.png", &leaf_png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn identify_returns_ranked_predictions() {
        // Index 74 is Tulsi in the default label set
        let response = app(Some(predictor(74)), None)
            .oneshot(identify_request(multipart_body("file", "leaf.png", &leaf_png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["predicted_class"], "Tulsi");
        assert_eq!(json["confidence"], 1.0);
        let predictions = json["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 5);
        assert_eq!(predictions[0]["rank"], 1);
        assert_eq!(predictions[0]["class"], "Tulsi");
        assert_eq!(predictions[0]["probability"], "100.0%");
    }

    #[tokio::test]
    async fn identify_undecodable_image_is_failure_payload() {
        let response = app(Some(predictor(0)), None)
            .oneshot(identify_request(multipart_body("file", "leaf.png", b"not an image")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn remedy_answers_from_knowledge_base() {
        let response = app(None, Some(remedy_engine("1. Remedy: tulsi tea [1]")))
            .oneshot(remedy_request(serde_json::json!({"symptoms": "I have a cough"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["response"], "1. Remedy: tulsi tea");
    }

    #[tokio::test]
    async fn remedy_rejects_blank_symptoms() {
        let response = app(None, Some(remedy_engine("unused")))
            .oneshot(remedy_request(serde_json::json!({"symptoms": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remedy_rejects_malformed_json() {
        let response = app(None, Some(remedy_engine("unused")))
            .oneshot(remedy_request(serde_json::json!({"question": "cough"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remedy_without_engine_is_503() {
        let response = app(None, None)
            .oneshot(remedy_request(serde_json::json!({"symptoms": "cough"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "REMEDY_UNAVAILABLE");
    }

    #[tokio::test]
    async fn remedy_upstream_failure_is_502() {
        let engine = Arc::new(RemedyEngine::new(
            Box::new(MockEmbedder::new()),
            Box::new({
                let store = SqliteVectorStore::in_memory().unwrap();
                ingest_text(
                    "a.md",
                    "Ginger tea with honey eases a sore throat.",
                    &PassageChunker::new(),
                    &MockEmbedder::new(),
                    &store,
                )
                .unwrap();
                store
            }),
            Box::new(MockChatClient::failing(500, "boom")),
            GenerationSettings::default(),
        ));
        let response = app(None, Some(engine))
            .oneshot(remedy_request(serde_json::json!({"symptoms": "sore throat"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_with_credentials() {
        let response = app(None, None)
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/remedy")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn cors_ignores_unknown_origin() {
        let response = app(None, None)
            .oneshot(
                Request::get("/api/health")
                    .header(header::ORIGIN, "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
