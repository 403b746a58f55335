//! Rendering — turns an aligned resume into a typeset document.
//!
//! Rendering sits outside the alignment core: it may fail (e.g. no TeX toolchain
//! on the host) without invalidating an alignment outcome. Handlers surface the
//! failure next to the outcome instead of replacing it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::alignment::outcome::Change;
use crate::models::Resume;

pub mod latex;

pub use latex::LatexRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Typesetting engine '{engine}' is not installed")]
    ToolchainMissing { engine: String },

    #[error("Typesetting timed out after {0:?}")]
    Timeout(Duration),

    #[error("Typesetting failed: {0}")]
    Compile(String),

    #[error("Rendering I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered resume: the document source plus the compiled PDF.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    /// Source format, e.g. "latex".
    pub format: &'static str,
    pub source: String,
    #[serde(skip)]
    pub pdf: Bytes,
    pub pdf_size_bytes: usize,
    /// Entries of the change log the rendered resume reflects.
    pub changes_applied: usize,
}

/// Carried in `AppState` as `Arc<dyn ResumeRenderer>`.
#[async_trait]
pub trait ResumeRenderer: Send + Sync {
    /// Document source for `resume`. Pure; never touches the toolchain.
    fn source(&self, resume: &Resume) -> String;

    /// Compiles `resume` into a PDF. `changes` is the log of edits already
    /// applied to `resume`, empty for a resume that was never aligned.
    async fn render(
        &self,
        resume: &Resume,
        changes: &[Change],
    ) -> Result<RenderedDocument, RenderError>;
}
