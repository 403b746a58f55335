use std::sync::Arc;

use crate::alignment::orchestrator::Orchestrator;
use crate::render::ResumeRenderer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the requirement extractor, rewrite engine and scorer.
    /// Runs are independent; the orchestrator holds no per-run state.
    pub orchestrator: Orchestrator,
    /// Pluggable renderer. Default: LatexRenderer with the configured engine.
    pub renderer: Arc<dyn ResumeRenderer>,
}
