//! Axum router configuration with middleware.
//!
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/",
            get(handlers::workflow::service_info).post(handlers::orchestrate::orchestrate),
        )
        .route("/orchestrate", post(handlers::orchestrate::orchestrate))
        .route("/workflows", get(handlers::workflow::list_workflows))
        .route("/health", get(handlers::workflow::health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use mlorch_core::workflow::parse_catalog;
    use mlorch_types::config::{EndpointConfig, OrchestratorConfig, WebhookConfig};

    const CATALOG: &str = r#"
workflows:
  - name: embeddings_only
    selector: request.create_user_embedding
    stages:
      - steps:
          - name: embed
            target: embed
            criticality: critical
            input:
              user_id: request.user_id
            auth_token_fields: [embed_token]
      - steps:
          - name: recommend
            target: recommend
            input:
              vectors: steps.embed.output.vectors
"#;

    fn state(server_uri: Option<&str>) -> AppState {
        let mut config = OrchestratorConfig::default();
        config.webhook = WebhookConfig {
            url: None,
            url_env: None,
            timeout_secs: 1,
        };
        if let Some(uri) = server_uri {
            for target in ["embed", "recommend"] {
                config.endpoints.insert(
                    target.to_string(),
                    EndpointConfig {
                        url: Some(format!("{uri}/{target}")),
                        url_env: None,
                    },
                );
            }
        }
        AppState::build(config, parse_catalog(CATALOG).unwrap()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(build_router(state(None)), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_workflows_are_listed_in_order() {
        let request = Request::builder().uri("/workflows").body(Body::empty()).unwrap();
        let (status, body) = send(build_router(state(None)), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "embeddings_only");
        assert_eq!(body[0]["stages"], 2);
        assert_eq!(body[0]["steps"], json!(["embed", "recommend"]));
    }

    #[tokio::test]
    async fn test_runs_flow_against_remote_services() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vectors": [1, 2]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/recommend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({
            "user_id": "u1",
            "session_id": "s1",
            "create_user_embedding": true,
            "embed_token": "tok",
            "identifier": "job-9"
        })
        .to_string();
        let app = build_router(state(Some(&server.uri())));
        let (status, report) = send(app, post_json("/orchestrate", &body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["flow_name"], "embeddings_only");
        assert_eq!(report["status"], "success");
        assert_eq!(report["summary"]["successful"], 2);
        assert_eq!(report["identifier"], "job-9");
        assert!(report["duration"].is_u64());
        assert!(report.get("duration_ms").is_none());
        assert_eq!(report.get("error"), Some(&Value::Null));
        for step in report["results"].as_array().unwrap() {
            assert!(step["step_name"].is_string());
            assert!(step["duration"].is_u64());
            assert_eq!(step.get("error"), Some(&Value::Null));
        }

        let received = server.received_requests().await.unwrap();
        let recommend = received.iter().find(|r| r.url.path() == "/recommend").unwrap();
        let payload: Value = serde_json::from_slice(&recommend.body).unwrap();
        assert_eq!(payload["vectors"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_failed_flow_still_answers_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let body = r#"{"user_id":"u1","session_id":"s1","create_user_embedding":true}"#;
        let app = build_router(state(Some(&server.uri())));
        let (status, report) = send(app, post_json("/", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"], "failed");
        assert_eq!(report["error"]["kind"], "critical_step_failed");
        assert_eq!(report["summary"]["skipped"], 1);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_rejected() {
        let body = r#"{"user_id":"u1","session_id":"s1"}"#;
        let (status, body) = send(build_router(state(None)), post_json("/orchestrate", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "NO_MATCHING_WORKFLOW");
    }

    #[tokio::test]
    async fn test_validation_and_syntax_errors_use_envelope() {
        let (status, body) = send(build_router(state(None)), post_json("/orchestrate", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);

        let request = post_json("/orchestrate", "{not json");
        let (status, body) = send(build_router(state(None)), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["code"], "MALFORMED_REQUEST");
    }
}
