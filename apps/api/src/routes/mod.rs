pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::alignment::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Alignment API
        .route("/api/v1/requirements", post(handlers::handle_requirements))
        .route("/api/v1/gaps", post(handlers::handle_gaps))
        .route("/api/v1/align", post(handlers::handle_align))
        // Render API
        .route("/api/v1/render", post(handlers::handle_render))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::alignment::orchestrator::{Orchestrator, RefinementConfig};
    use crate::alignment::outcome::Change;
    use crate::alignment::rewrite::RewriteBackend;
    use crate::alignment::scorer::Scorer;
    use crate::alignment::testing::{python_git_resume, revise, ScriptedRewriter, ScriptedScorer};
    use crate::errors::RewriteError;
    use crate::models::Resume;
    use crate::render::{RenderError, RenderedDocument, ResumeRenderer};

    /// Behaves like a host without a TeX installation.
    struct NoToolchainRenderer;

    #[async_trait]
    impl ResumeRenderer for NoToolchainRenderer {
        fn source(&self, resume: &Resume) -> String {
            format!("% {}", resume.full_name)
        }

        async fn render(
            &self,
            _resume: &Resume,
            _changes: &[Change],
        ) -> Result<RenderedDocument, RenderError> {
            Err(RenderError::ToolchainMissing {
                engine: "pdflatex".to_string(),
            })
        }
    }

    /// Skips compilation and reports what it was given.
    struct EchoRenderer;

    #[async_trait]
    impl ResumeRenderer for EchoRenderer {
        fn source(&self, resume: &Resume) -> String {
            format!("% {}", resume.full_name)
        }

        async fn render(
            &self,
            resume: &Resume,
            changes: &[Change],
        ) -> Result<RenderedDocument, RenderError> {
            Ok(RenderedDocument {
                format: "latex",
                source: self.source(resume),
                pdf: bytes::Bytes::from_static(b"%PDF-1.5"),
                pdf_size_bytes: 8,
                changes_applied: changes.len(),
            })
        }
    }

    fn app(rewriter: Arc<dyn RewriteBackend>, scorer: Arc<dyn Scorer>) -> Router {
        app_with_renderer(rewriter, scorer, Arc::new(NoToolchainRenderer))
    }

    fn app_with_renderer(
        rewriter: Arc<dyn RewriteBackend>,
        scorer: Arc<dyn Scorer>,
        renderer: Arc<dyn ResumeRenderer>,
    ) -> Router {
        let refinement = RefinementConfig {
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        build_router(AppState {
            orchestrator: Orchestrator::new(refinement, rewriter, scorer),
            renderer,
        })
    }

    fn converging_app() -> Router {
        app(
            Arc::new(ScriptedRewriter::new(vec![
                Ok(vec![revise(0, "Built REST APIs using Python and FastAPI", &["FastAPI"])]),
                Ok(vec![revise(
                    2,
                    "Deployed Docker-packaged microservices with Python on AWS",
                    &["Docker"],
                )]),
            ])),
            Arc::new(ScriptedScorer::scores(&[65.0, 88.0, 95.0])),
        )
    }

    fn backend_job() -> Value {
        json!({
            "title": "Backend Engineer",
            "company": "Acme",
            "description": "We are hiring a backend engineer to build and operate our Python API platform.",
            "required_skills": ["Python", "FastAPI", "Docker"]
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let response = converging_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "aligncv-api");
    }

    #[tokio::test]
    async fn test_requirements_preview() {
        let (status, body) =
            post_json(converging_app(), "/api/v1/requirements", json!({ "job": backend_job() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["requirements"]["must_have"],
            json!(["Python", "FastAPI", "Docker"])
        );
    }

    #[tokio::test]
    async fn test_short_description_is_unprocessable() {
        let job = json!({ "title": "Engineer", "company": "Acme", "description": "Python dev" });
        let (status, body) = post_json(converging_app(), "/api/v1/requirements", json!({ "job": job })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "EXTRACTION_ERROR");
    }

    #[tokio::test]
    async fn test_gap_report() {
        let body = json!({ "resume": python_git_resume(), "job": backend_job() });
        let (status, body) = post_json(converging_app(), "/api/v1/gaps", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gap"]["missing_skills"], json!(["FastAPI", "Docker"]));
    }

    #[tokio::test]
    async fn test_align_converges() {
        let body = json!({ "resume": python_git_resume(), "job": backend_job() });
        let (status, body) = post_json(converging_app(), "/api/v1/align", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["termination"], "CONVERGED");
        assert_eq!(body["changes"].as_array().unwrap().len(), 2);
        assert_eq!(body["iterations"].as_array().unwrap().len(), 3);
        assert_eq!(body["metrics"]["ats_score"], 95.0);
        assert!(body.get("rendering").is_none());
    }

    #[tokio::test]
    async fn test_align_survives_missing_toolchain() {
        let body = json!({ "resume": python_git_resume(), "job": backend_job(), "render": true });
        let (status, body) = post_json(converging_app(), "/api/v1/align", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["termination"], "CONVERGED");
        assert!(body.get("rendering").is_none());
        assert!(body["render_error"].as_str().unwrap().contains("pdflatex"));
        assert_eq!(body["latex_source"], "% John Doe");
    }

    #[tokio::test]
    async fn test_align_renders_with_applied_change_log() {
        let app = app_with_renderer(
            Arc::new(ScriptedRewriter::new(vec![
                Ok(vec![revise(0, "Built REST APIs using Python and FastAPI", &["FastAPI"])]),
                Ok(vec![revise(
                    2,
                    "Deployed Docker-packaged microservices with Python on AWS",
                    &["Docker"],
                )]),
            ])),
            Arc::new(ScriptedScorer::scores(&[65.0, 88.0, 95.0])),
            Arc::new(EchoRenderer),
        );
        let body = json!({ "resume": python_git_resume(), "job": backend_job(), "render": true });
        let (status, body) = post_json(app, "/api/v1/align", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rendering"]["changes_applied"], 2);
        assert!(body.get("render_error").is_none());
    }

    #[tokio::test]
    async fn test_failed_run_returns_502_with_outcome() {
        let unavailable = || {
            Err(RewriteError::Unavailable {
                message: "overloaded".to_string(),
                retryable: true,
            })
        };
        let app = app(
            Arc::new(ScriptedRewriter::new(vec![unavailable(), unavailable()])),
            Arc::new(ScriptedScorer::scores(&[60.0])),
        );
        let body = json!({ "resume": python_git_resume(), "job": backend_job() });
        let (status, body) = post_json(app, "/api/v1/align", body).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["termination"], "FAILED");
        assert_eq!(body["resume"]["full_name"], "John Doe");
        assert!(body["error"].as_str().unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_render_without_toolchain_is_503() {
        let (status, body) = post_json(
            converging_app(),
            "/api/v1/render",
            json!({ "resume": python_git_resume() }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "RENDER_UNAVAILABLE");
    }
}
