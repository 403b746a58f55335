//! LaTeX renderer: builds escaped LaTeX source from a resume and compiles it with
//! the configured engine (pdflatex by default) in a throwaway directory.

use std::fmt::Write as _;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::alignment::outcome::Change;
use crate::models::{Resume, SectionContent};
use crate::render::{RenderError, RenderedDocument, ResumeRenderer};

const PREAMBLE: &str = r"\documentclass[11pt,letterpaper]{article}
\usepackage[margin=0.75in]{geometry}
\usepackage[T1]{fontenc}
\usepackage{enumitem}
\usepackage[hidelinks]{hyperref}
\setlist[itemize]{leftmargin=*,noitemsep,topsep=2pt}
\pagestyle{empty}
\setlength{\parindent}{0pt}
";

/// Lines of engine output kept in a compile error.
const LOG_TAIL_LINES: usize = 15;

#[derive(Debug, Clone)]
pub struct LatexRenderer {
    engine: String,
    timeout: Duration,
}

impl LatexRenderer {
    pub fn new(engine: impl Into<String>, timeout: Duration) -> Self {
        Self {
            engine: engine.into(),
            timeout,
        }
    }

    async fn compile(&self, source: &str) -> Result<Bytes, RenderError> {
        let work_dir = tempfile::Builder::new()
            .prefix("aligncv-render-")
            .tempdir()?;
        let tex_path = work_dir.path().join("resume.tex");
        tokio::fs::write(&tex_path, source).await?;

        let mut command = Command::new(&self.engine);
        command
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("resume.tex")
            .current_dir(work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::ToolchainMissing {
                    engine: self.engine.clone(),
                })
            }
            Ok(Err(e)) => return Err(RenderError::Io(e)),
            Err(_) => return Err(RenderError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            // TeX engines report errors on stdout
            let log = String::from_utf8_lossy(&output.stdout);
            let tail: Vec<&str> = log.lines().rev().take(LOG_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            warn!(engine = %self.engine, status = ?output.status.code(), "LaTeX compile failed");
            return Err(RenderError::Compile(tail.join("\n")));
        }

        let pdf = tokio::fs::read(work_dir.path().join("resume.pdf")).await?;
        Ok(Bytes::from(pdf))
    }
}

#[async_trait]
impl ResumeRenderer for LatexRenderer {
    fn source(&self, resume: &Resume) -> String {
        latex_source(resume)
    }

    async fn render(
        &self,
        resume: &Resume,
        changes: &[Change],
    ) -> Result<RenderedDocument, RenderError> {
        let source = latex_source(resume);
        let pdf = self.compile(&source).await?;
        info!(
            engine = %self.engine,
            pdf_size_bytes = pdf.len(),
            changes = changes.len(),
            "Resume rendered"
        );
        Ok(RenderedDocument {
            format: "latex",
            source,
            pdf_size_bytes: pdf.len(),
            pdf,
            changes_applied: changes.len(),
        })
    }
}

/// Builds a complete LaTeX document for `resume`. All user text is escaped.
pub fn latex_source(resume: &Resume) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("\\begin{document}\n\n");

    let _ = writeln!(
        out,
        "{{\\centering {{\\Large\\textbf{{{}}}}}\\\\[2pt]",
        escape_latex(&resume.full_name)
    );
    let contact = &resume.contact;
    let details: Vec<String> = [
        &contact.email,
        &contact.phone,
        &contact.location,
        &contact.linkedin,
        &contact.github,
        &contact.website,
    ]
    .into_iter()
    .flatten()
    .filter(|v| !v.trim().is_empty())
    .map(|v| escape_latex(v))
    .collect();
    let _ = writeln!(out, "{}\\par}}\n", details.join(" \\textbar{} "));

    for section in &resume.sections {
        let _ = writeln!(out, "\\section*{{{}}}", escape_latex(&section.title));
        match &section.content {
            SectionContent::Bullets(items) if items.is_empty() => {}
            SectionContent::Bullets(items) => {
                out.push_str("\\begin{itemize}\n");
                for item in items {
                    let _ = writeln!(out, "  \\item {}", escape_latex(item));
                }
                out.push_str("\\end{itemize}\n");
            }
            SectionContent::Skills(items) => {
                let skills: Vec<String> = items.iter().map(|s| escape_latex(s)).collect();
                let _ = writeln!(out, "{}", skills.join(", "));
            }
        }
        out.push('\n');
    }

    out.push_str("\\end{document}\n");
    out
}

/// Escapes LaTeX special characters in plain text.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}
