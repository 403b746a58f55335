use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

// ────────────────────────────────────────────────────────────────────────────
// Alignment taxonomy
// ────────────────────────────────────────────────────────────────────────────

/// The job description cannot seed a run. Fatal: raised before any iteration.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("Job description text is empty")]
    EmptyDescription,

    #[error("Job description is too short to extract requirements ({len} chars, minimum {min})")]
    InsufficientText { len: usize, min: usize },

    #[error("No skills or keywords could be extracted from the job description")]
    NoRequirements,
}

/// The rewrite capability failed for one call. Retried once by the orchestrator.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Rewrite backend unavailable: {message}")]
    Unavailable { message: String, retryable: bool },

    #[error("Rewrite call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rewrite output unusable: {0}")]
    Unusable(String),
}

impl RewriteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RewriteError::Unavailable { retryable, .. } => *retryable,
            RewriteError::Timeout(_) | RewriteError::Unusable(_) => true,
        }
    }
}

/// The scoring capability failed or returned an invalid value.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring backend unavailable: {message}")]
    Unavailable { message: String, retryable: bool },

    #[error("Scoring call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scorer returned invalid {field}: {value}")]
    Invalid { field: &'static str, value: f64 },
}

impl ScoringError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Unavailable { retryable, .. } => *retryable,
            ScoringError::Timeout(_) | ScoringError::Invalid { .. } => true,
        }
    }
}

/// A proposed edit claimed keywords its revised text does not contain.
/// Never propagated: the edit is dropped and the violation is logged and counted.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize)]
#[error("Post-condition violated at {location}: {detail}")]
pub struct PostConditionViolation {
    pub location: String,
    pub claimed: Vec<String>,
    pub detail: String,
}

impl From<LlmError> for RewriteError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Parse(_) | LlmError::EmptyContent => RewriteError::Unusable(e.to_string()),
            other => RewriteError::Unavailable {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl From<LlmError> for ScoringError {
    fn from(e: LlmError) -> Self {
        ScoringError::Unavailable {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP-facing error
// ────────────────────────────────────────────────────────────────────────────

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Extraction(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_ERROR",
                e.to_string(),
            ),
            AppError::Render(msg) => {
                tracing::warn!("Render error: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "RENDER_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
