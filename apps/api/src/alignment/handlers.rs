//! Axum route handlers for the Alignment API.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alignment::gap::{analyze_gaps, GapReport};
use crate::alignment::outcome::{AlignmentOutcome, Change};
use crate::errors::AppError;
use crate::models::{JobDescription, JobRequirements, Resume};
use crate::render::RenderedDocument;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RequirementsRequest {
    pub job: JobDescription,
}

#[derive(Debug, Serialize)]
pub struct RequirementsResponse {
    pub requirements: JobRequirements,
}

#[derive(Debug, Deserialize)]
pub struct GapRequest {
    pub resume: Resume,
    pub job: JobDescription,
}

#[derive(Debug, Serialize)]
pub struct GapResponse {
    pub requirements: JobRequirements,
    pub gap: GapReport,
}

#[derive(Debug, Deserialize)]
pub struct AlignRequest {
    pub resume: Resume,
    pub job: JobDescription,
    /// Also typeset the aligned resume.
    #[serde(default)]
    pub render: bool,
}

#[derive(Debug, Serialize)]
pub struct AlignResponse {
    #[serde(flatten)]
    pub outcome: AlignmentOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering: Option<RenderedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
    /// Document source when compiling failed, so the caller can typeset elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latex_source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub resume: Resume,
    /// Change log from an earlier alignment of `resume`, if any.
    #[serde(default)]
    pub changes: Vec<Change>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/requirements
///
/// Previews requirement extraction for a job description.
pub async fn handle_requirements(
    State(state): State<AppState>,
    Json(request): Json<RequirementsRequest>,
) -> Result<Json<RequirementsResponse>, AppError> {
    let requirements = state.orchestrator.extractor().extract(&request.job)?;
    Ok(Json(RequirementsResponse { requirements }))
}

/// POST /api/v1/gaps
///
/// Reports coverage, missing skills and weak bullets without rewriting anything.
pub async fn handle_gaps(
    State(state): State<AppState>,
    Json(request): Json<GapRequest>,
) -> Result<Json<GapResponse>, AppError> {
    validate_resume(&request.resume)?;
    let requirements = state.orchestrator.extractor().extract(&request.job)?;
    let gap = analyze_gaps(
        &request.resume,
        &requirements,
        state.orchestrator.config().weak_bullet_threshold,
    );
    Ok(Json(GapResponse { requirements, gap }))
}

/// POST /api/v1/align
///
/// Runs the full refinement loop. Responds 200 for CONVERGED, EXHAUSTED, STALLED
/// and CANCELLED, and 502 with the same body for FAILED. Rendering failures are
/// reported in `render_error` and never fail the request.
pub async fn handle_align(
    State(state): State<AppState>,
    Json(request): Json<AlignRequest>,
) -> Result<(StatusCode, Json<AlignResponse>), AppError> {
    validate_resume(&request.resume)?;
    let AlignRequest { resume, job, render } = request;

    // Dropping the handler (client went away) cancels the run.
    let cancel = CancellationToken::new();
    let _disconnect_guard = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.align(resume, &job, &cancel).await })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("alignment task aborted: {e}")))??;

    let (rendering, render_error, latex_source) = if render {
        match state
            .renderer
            .render(&outcome.resume, outcome.applied_changes())
            .await
        {
            Ok(document) => (Some(document), None, None),
            Err(e) => {
                warn!(run_id = %outcome.run_id, error = %e, "Rendering unavailable, returning outcome only");
                let source = state.renderer.source(&outcome.resume);
                (None, Some(e.to_string()), Some(source))
            }
        }
    } else {
        (None, None, None)
    };

    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    info!(
        run_id = %outcome.run_id,
        termination = %outcome.termination,
        changes = outcome.metrics.total_changes,
        status = status.as_u16(),
        "Alignment request completed"
    );

    Ok((
        status,
        Json(AlignResponse {
            outcome,
            rendering,
            render_error,
            latex_source,
        }),
    ))
}

/// POST /api/v1/render
///
/// Typesets a resume and returns the PDF.
pub async fn handle_render(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> Result<Response, AppError> {
    validate_resume(&request.resume)?;
    let document = state
        .renderer
        .render(&request.resume, &request.changes)
        .await
        .map_err(|e| AppError::Render(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, "inline; filename=\"resume.pdf\"")
        .body(Body::from(document.pdf))
        .map_err(|e| AppError::Internal(e.into()))
}

/// Section ids address bullets, so they must be present and unique.
fn validate_resume(resume: &Resume) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::new();
    for section in &resume.sections {
        if section.id.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "section '{}' has an empty id",
                section.title
            )));
        }
        if !seen.insert(section.id.as_str()) {
            return Err(AppError::Validation(format!(
                "duplicate section id '{}'",
                section.id
            )));
        }
    }
    Ok(())
}
