//! Scripted backends and fixtures shared by the alignment and route tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::alignment::rewrite::{ProposedEdit, RewriteBackend, RewriteRequest};
use crate::alignment::scorer::{ScoreCard, Scorer};
use crate::errors::{RewriteError, ScoringError};
use crate::models::{JobRequirements, Resume, Section, SectionKind};

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Skills {Python, Git} and three experience bullets.
pub fn python_git_resume() -> Resume {
    Resume::new(
        "John Doe",
        vec![
            Section::skills("skills", "Skills", strings(&["Python", "Git"])),
            Section::bullets(
                "experience-0",
                "Software Engineer, Acme",
                SectionKind::Experience,
                strings(&[
                    "Built REST APIs using Python and Flask",
                    "Collaborated with design team",
                    "Deployed microservices with Python on AWS",
                ]),
            ),
        ],
    )
}

/// Must-have {Python, FastAPI, Docker}; extra keywords {microservices, AWS, REST}.
pub fn backend_requirements() -> JobRequirements {
    JobRequirements::new(
        strings(&["Python", "FastAPI", "Docker"]),
        strings(&["microservices", "AWS", "REST"]),
    )
}

/// Rewrites bullet `index` of `experience-0`.
pub fn revise(index: usize, text: &str, keywords: &[&str]) -> ProposedEdit {
    ProposedEdit::ReviseBullet {
        section_id: "experience-0".to_string(),
        bullet_index: index,
        revised_text: text.to_string(),
        keywords_added: strings(keywords),
        reason: format!("Job requires {}", keywords.join(", ")),
    }
}

pub fn card(score: f64) -> ScoreCard {
    ScoreCard {
        score,
        keyword_match: score,
        missing_keywords: Vec::new(),
        critique: None,
    }
}

/// Replays a fixed script of responses, then proposes nothing.
/// Records the cap of every request it sees.
pub struct ScriptedRewriter {
    script: Mutex<VecDeque<Result<Vec<ProposedEdit>, RewriteError>>>,
    caps: Mutex<Vec<usize>>,
}

impl ScriptedRewriter {
    pub fn new(script: Vec<Result<Vec<ProposedEdit>, RewriteError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            caps: Mutex::new(Vec::new()),
        }
    }

    pub fn caps(&self) -> Vec<usize> {
        self.caps.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewriteBackend for ScriptedRewriter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn propose(&self, request: &RewriteRequest<'_>) -> Result<Vec<ProposedEdit>, RewriteError> {
        self.caps.lock().unwrap().push(request.max_edits);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// Replays a fixed script of score cards; fails once the script runs out.
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Result<ScoreCard, ScoringError>>>,
    calls: Mutex<usize>,
}

impl ScriptedScorer {
    pub fn new(script: Vec<Result<ScoreCard, ScoringError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn scores(scores: &[f64]) -> Self {
        Self::new(scores.iter().map(|&s| Ok(card(s))).collect())
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn score(
        &self,
        _resume: &Resume,
        _requirements: &JobRequirements,
    ) -> Result<ScoreCard, ScoringError> {
        *self.calls.lock().unwrap() += 1;
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ScoringError::Unavailable {
                message: "script exhausted".to_string(),
                retryable: false,
            })
        })
    }
}

/// Never answers.
pub struct HangingRewriter;

#[async_trait]
impl RewriteBackend for HangingRewriter {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn propose(&self, _request: &RewriteRequest<'_>) -> Result<Vec<ProposedEdit>, RewriteError> {
        std::future::pending().await
    }
}
