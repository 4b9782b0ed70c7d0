//! API router.
//!
//! Returns a composable `Router` with every endpoint under `/api/`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::endpoints::{assessments, extract, health, portfolio};
use crate::api::types::ApiContext;
use crate::config::MAX_UPLOAD_BYTES;
use crate::core_state::CoreState;

/// Request body cap. Batches carry several documents; each one is still
/// checked against the per-file limit.
const MAX_REQUEST_BYTES: usize = 8 * MAX_UPLOAD_BYTES;

/// Build the API router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(health::check))
        // Stateless extraction
        .route("/extract/founding", post(extract::founding))
        .route("/extract/progress", post(extract::progress))
        .route("/extract/evidence", post(extract::evidence))
        .route("/suggest-indicators", post(extract::suggest_indicators))
        // Assessment management
        .route("/assessments", get(assessments::list).post(assessments::create))
        .route("/assessments/active", get(assessments::active))
        .route("/assessments/:id", delete(assessments::delete))
        .route("/assessments/:id/open", post(assessments::open))
        .route("/assessments/:id/reset", post(assessments::reset))
        .route("/dashboard", post(assessments::dashboard))
        // Navigation
        .route("/assessments/active/stage", post(assessments::go_to))
        .route(
            "/assessments/active/stages/:stage/confirm",
            post(assessments::confirm_stage),
        )
        // Stage 1
        .route("/assessments/active/founding", post(assessments::apply_founding))
        .route(
            "/assessments/active/founding/manual",
            post(assessments::manual_entry),
        )
        .route(
            "/assessments/active/founding/fields",
            put(assessments::update_fields),
        )
        .route("/assessments/active/indicators", post(assessments::add_indicator))
        .route(
            "/assessments/active/indicators/:id",
            put(assessments::update_indicator).delete(assessments::remove_indicator),
        )
        // Stage 2
        .route("/assessments/active/reports", post(assessments::process_reports))
        .route(
            "/assessments/active/reports/cancel",
            post(assessments::cancel_reports),
        )
        .route(
            "/assessments/active/reports/:id",
            delete(assessments::remove_report),
        )
        .route(
            "/assessments/active/progress/:indicator_id/override",
            put(assessments::set_progress_override),
        )
        // Stage 3
        .route("/assessments/active/evidence", post(assessments::add_evidence))
        .route(
            "/assessments/active/evidence/:id",
            put(assessments::update_evidence).delete(assessments::remove_evidence),
        )
        .route(
            "/assessments/active/evidence/:id/suggest",
            post(assessments::suggest_links),
        )
        .route("/assessments/active/validate", post(assessments::validate))
        // Stage 4
        .route(
            "/assessments/active/ratio",
            get(assessments::ratio_breakdown).put(assessments::update_ratio),
        )
        .route(
            "/assessments/active/outcomes/:indicator_id",
            put(assessments::update_outcome),
        )
        // Stage 5
        .route("/assessments/active/report", post(assessments::generate_report))
        // Portfolio
        .route("/portfolio", get(portfolio::report))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::ai::mock::MockBackend;
    use crate::ai::BackendId;
    use crate::core_state::test_support::{core_with, offline_core};

    const BOUNDARY: &str = "impactlens-test-boundary";

    const FOUNDING_REPLY: &str = r#"{
        "projectDetails": {"projectName": "Skills for Youth", "ngoName": "Asha Trust", "totalBudget": 2000000},
        "kpis": [
            {"id": "kpi-1", "name": "Youth trained", "targetValue": 500, "unit": "people", "category": "output"},
            {"id": "kpi-2", "name": "Youth placed", "targetValue": 200, "unit": "people", "category": "outcome"}
        ]
    }"#;

    const PROGRESS_REPLY: &str = r#"{
        "reportDate": "2024-06-30",
        "reportPeriod": "Q1",
        "kpiValues": [
            {"kpiId": "kpi-1", "reportedValue": 450},
            {"kpiId": "kpi-2", "reportedValue": 100}
        ]
    }"#;

    fn claude_only(reply: &str) -> Arc<CoreState> {
        Arc::new(core_with(
            Arc::new(MockBackend::new(BackendId::Claude).with_response(reply)),
            Arc::new(MockBackend::new(BackendId::Ollama).with_available(false)),
        ))
    }

    fn multipart_body(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file {
                Some((file_name, content_type)) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                    );
                }
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn pdf(file_name: &str) -> (&str, Option<(&str, &str)>, &'static [u8]) {
        ("file", Some((file_name, "application/pdf")), &b"%PDF-1.4 test"[..])
    }

    #[tokio::test]
    async fn health_reports_no_provider_when_offline() {
        let app = api_router(Arc::new(offline_core()));
        let response = app.oneshot(empty_request("GET", "/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["activeProvider"], "none");
        assert_eq!(json["claude"]["available"], false);
        assert_eq!(json["ollama"]["available"], false);
    }

    #[tokio::test]
    async fn founding_extraction_returns_data_and_provider() {
        let app = api_router(claude_only(FOUNDING_REPLY));
        let body = multipart_body(&[pdf("mou.pdf")]);
        let response = app
            .oneshot(multipart_request("/api/extract/founding", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["provider"], "claude");
        assert_eq!(json["data"]["kpis"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected_before_extraction() {
        let claude = Arc::new(MockBackend::new(BackendId::Claude).with_response(FOUNDING_REPLY));
        let core = Arc::new(core_with(
            claude.clone(),
            Arc::new(MockBackend::new(BackendId::Ollama).with_available(false)),
        ));
        let app = api_router(core);
        let body = multipart_body(&[("file", Some(("notes.txt", "text/plain")), &b"hello"[..])]);
        let response = app
            .oneshot(multipart_request("/api/extract/founding", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(claude.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_400() {
        let app = api_router(claude_only(FOUNDING_REPLY));
        let body = multipart_body(&[("note", None, &b"nothing here"[..])]);
        let response = app
            .oneshot(multipart_request("/api/extract/founding", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_backend_is_503() {
        let app = api_router(Arc::new(offline_core()));
        let body = multipart_body(&[pdf("mou.pdf")]);
        let response = app
            .oneshot(multipart_request("/api/extract/founding", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["canRetry"], false);
    }

    #[tokio::test]
    async fn double_failure_is_retryable_422() {
        let core = Arc::new(core_with(
            Arc::new(MockBackend::new(BackendId::Claude).with_failure("boom")),
            Arc::new(MockBackend::new(BackendId::Ollama).with_failure("down")),
        ));
        let app = api_router(core);
        let body = multipart_body(&[pdf("mou.pdf")]);
        let response = app
            .oneshot(multipart_request("/api/extract/founding", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["canRetry"], true);
    }

    #[tokio::test]
    async fn unknown_provider_header_is_400() {
        let app = api_router(claude_only(FOUNDING_REPLY));
        let body = multipart_body(&[pdf("mou.pdf")]);
        let mut request = multipart_request("/api/extract/founding", body);
        request
            .headers_mut()
            .insert("x-ai-provider", "gpt".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn suggest_indicators_degrades_to_empty_list() {
        let app = api_router(Arc::new(offline_core()));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/suggest-indicators",
                serde_json::json!({"fileInfo": "survey.csv", "kpiList": "- kpi-1: Youth trained"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["kpiIds"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn evidence_requires_both_summaries() {
        let app = api_router(claude_only("{}"));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/extract/evidence",
                serde_json::json!({"evidenceMetadata": "- survey.csv (survey)"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn active_assessment_without_one_is_409() {
        let app = api_router(Arc::new(offline_core()));
        let response = app
            .oneshot(empty_request("GET", "/api/assessments/active"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn pipeline_flow_through_the_api() {
        let claude = Arc::new(
            MockBackend::new(BackendId::Claude)
                .then_reply(FOUNDING_REPLY)
                .then_reply(PROGRESS_REPLY),
        );
        let core = Arc::new(core_with(
            claude,
            Arc::new(MockBackend::new(BackendId::Ollama).with_available(false)),
        ));

        // Create
        let response = api_router(core.clone())
            .oneshot(json_request(
                "POST",
                "/api/assessments",
                serde_json::json!({"name": "Draft", "partnerName": "Someone"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Founding
        let response = api_router(core.clone())
            .oneshot(multipart_request(
                "/api/assessments/active/founding",
                multipart_body(&[pdf("mou.pdf")]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["applied"]["indicatorCount"], 2);
        assert_eq!(json["data"]["assessment"]["name"], "Skills for Youth");

        // Confirm stage 1
        let response = api_router(core.clone())
            .oneshot(empty_request("POST", "/api/assessments/active/stages/1/confirm"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Progress batch
        let response = api_router(core.clone())
            .oneshot(multipart_request(
                "/api/assessments/active/reports",
                multipart_body(&[pdf("q1.pdf")]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["completed"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"]["cancelled"], false);

        let store = core.store().lock().await;
        let active = store.active().unwrap();
        assert_eq!(active.reports.progress.len(), 2);
        assert!(active.founding.confirmed);
    }

    #[tokio::test]
    async fn locked_founding_edit_is_409() {
        let core = Arc::new(offline_core());
        {
            let mut store = core.store().lock().await;
            store.create_assessment("Locked", None).unwrap();
            store.start_manual_entry().unwrap();
            store
                .add_indicator(crate::models::Indicator {
                    id: String::new(),
                    name: "Trees planted".into(),
                    target_value: 100.0,
                    unit: "trees".into(),
                    target_date: None,
                    category: crate::models::IndicatorCategory::Output,
                })
                .unwrap();
            store.confirm_stage(crate::models::Stage::FOUNDING).unwrap();
        }

        let response = api_router(core)
            .oneshot(json_request(
                "PUT",
                "/api/assessments/active/founding/fields",
                serde_json::json!({"projectName": "Renamed"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn locked_stage_navigation_does_not_move() {
        let core = Arc::new(offline_core());
        core.store().lock().await.create_assessment("Nav", None).unwrap();

        let response = api_router(core)
            .oneshot(json_request(
                "POST",
                "/api/assessments/active/stage",
                serde_json::json!({"stage": 4}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["moved"], false);
    }

    #[tokio::test]
    async fn cancel_without_batch_reports_false() {
        let app = api_router(Arc::new(offline_core()));
        let response = app
            .oneshot(empty_request("POST", "/api/assessments/active/reports/cancel"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["cancelled"], false);
    }

    #[tokio::test]
    async fn portfolio_is_empty_without_assessments() {
        let app = api_router(Arc::new(offline_core()));
        let response = app.oneshot(empty_request("GET", "/api/portfolio")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
    }
}
