mod alignment;
mod config;
mod errors;
mod llm_client;
mod models;
mod render;
mod routes;
mod state;
mod text;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::alignment::orchestrator::Orchestrator;
use crate::alignment::rewrite::LlmRewriter;
use crate::alignment::scorer::{KeywordScorer, LlmScorer, Scorer};
use crate::config::{Config, ScorerBackend};
use crate::llm_client::LlmClient;
use crate::render::LatexRenderer;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AlignCV API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client (shared by the rewriter and, optionally, the scorer)
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.llm_max_concurrency)?;
    info!(
        max_concurrency = config.llm_max_concurrency,
        "LLM client initialized (model: {})",
        llm_client::MODEL
    );

    // Initialize scorer (KeywordScorer by default, swap via SCORER_BACKEND)
    let scorer: Arc<dyn Scorer> = match config.scorer_backend {
        ScorerBackend::Keyword => Arc::new(KeywordScorer),
        ScorerBackend::Llm => Arc::new(LlmScorer(llm.clone())),
    };
    info!(backend = scorer.name(), "Scorer initialized");

    let refinement = config.refinement.clone();
    info!(
        target_score = refinement.target_score,
        max_iterations = refinement.max_iterations,
        change_cap = refinement.change_cap,
        stall_threshold = refinement.stall_threshold,
        call_timeout_secs = refinement.call_timeout.as_secs(),
        "Refinement settings"
    );
    let orchestrator = Orchestrator::new(refinement, Arc::new(LlmRewriter(llm)), scorer);

    // Rendering shares the per-call deadline; a missing engine only disables PDFs
    let renderer = Arc::new(LatexRenderer::new(
        config.latex_engine.clone(),
        config.refinement.call_timeout,
    ));

    // Build app state
    let state = AppState {
        orchestrator,
        renderer,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins once the web client has a fixed domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
