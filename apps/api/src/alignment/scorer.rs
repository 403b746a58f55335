//! Scorer — pluggable, trait-based ATS scoring of a resume against job requirements.
//!
//! Default: `KeywordScorer` (pure-Rust, fast, deterministic, fully testable).
//! Alternative: `LlmScorer` (weighted ATS rubric via Claude).
//!
//! The orchestrator holds an `Arc<dyn Scorer>`, swapped at startup via `SCORER_BACKEND`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::alignment::prompts::{resume_outline, SCORE_PROMPT_TEMPLATE, SCORE_SYSTEM};
use crate::errors::ScoringError;
use crate::llm_client::{prompts::JSON_ONLY_RULES, LlmClient};
use crate::models::{JobRequirements, Resume};
use crate::text::{contains_normalized, normalize};

// ────────────────────────────────────────────────────────────────────────────
// Output data model (shared across all scorer backends)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// ATS score, 0 – 100.
    pub score: f64,
    /// Share of ATS keywords present in the resume, 0 – 100.
    pub keyword_match: f64,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    /// Reviewer feedback handed to the next rewrite, if any.
    #[serde(default)]
    pub critique: Option<String>,
}

impl ScoreCard {
    /// Rejects NaN, infinite or out-of-range values.
    pub fn validate(self) -> Result<Self, ScoringError> {
        for (field, value) in [("score", self.score), ("keyword_match", self.keyword_match)] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ScoringError::Invalid { field, value });
            }
        }
        Ok(self)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implement this to swap scoring backends without touching the orchestrator.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Short backend name for logs ("keyword" | "llm").
    fn name(&self) -> &'static str;

    async fn score(
        &self,
        resume: &Resume,
        requirements: &JobRequirements,
    ) -> Result<ScoreCard, ScoringError>;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordScorer — default implementation
// ────────────────────────────────────────────────────────────────────────────

/// Pure-Rust keyword scorer. No LLM call.
///
/// Algorithm:
/// 1. For each ATS keyword (must-haves weigh 2, the rest 1):
///    - present in skills and in a bullet → strength 1.0
///    - present in a bullet only → strength 0.8
///    - present in skills only → strength 0.6
///    - absent → strength 0.0
/// 2. score = Σ(strength × weight) / Σ(weight) × 100, one decimal
/// 3. keyword_match = present keywords / all keywords × 100
pub struct KeywordScorer;

#[async_trait]
impl Scorer for KeywordScorer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn score(
        &self,
        resume: &Resume,
        requirements: &JobRequirements,
    ) -> Result<ScoreCard, ScoringError> {
        Ok(compute_keyword_score(resume, requirements))
    }
}

const MUST_HAVE_WEIGHT: f64 = 2.0;
const KEYWORD_WEIGHT: f64 = 1.0;

fn compute_keyword_score(resume: &Resume, requirements: &JobRequirements) -> ScoreCard {
    let keywords = requirements.ats_keywords();
    if keywords.is_empty() {
        return ScoreCard {
            score: 100.0,
            keyword_match: 100.0,
            missing_keywords: Vec::new(),
            critique: None,
        };
    }

    let skill_texts: Vec<String> = resume.skills().map(normalize).collect();
    let bullet_texts: Vec<String> = resume.bullets().map(|(_, t)| normalize(t)).collect();

    let mut total_weight = 0.0;
    let mut total_score = 0.0;
    let mut present = 0usize;
    let mut missing_keywords = Vec::new();

    for keyword in keywords {
        let needle = normalize(keyword);
        let weight = if requirements.is_must_have(keyword) {
            MUST_HAVE_WEIGHT
        } else {
            KEYWORD_WEIGHT
        };
        total_weight += weight;

        let in_skills = skill_texts.iter().any(|t| contains_normalized(t, &needle));
        let in_bullets = bullet_texts.iter().any(|t| contains_normalized(t, &needle));

        let strength = match (in_skills, in_bullets) {
            (true, true) => 1.0,
            (false, true) => 0.8,
            (true, false) => 0.6,
            (false, false) => 0.0,
        };

        if strength > 0.0 {
            present += 1;
        } else {
            missing_keywords.push(keyword.clone());
        }
        total_score += strength * weight;
    }

    let score = round1(total_score / total_weight * 100.0);
    let keyword_match = round1(present as f64 / keywords.len() as f64 * 100.0);
    let critique = build_critique(score, &missing_keywords);

    ScoreCard {
        score,
        keyword_match,
        missing_keywords,
        critique,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Builds reviewer feedback from the score and the missing keywords.
fn build_critique(score: f64, missing: &[String]) -> Option<String> {
    if missing.is_empty() {
        return None;
    }
    let top: Vec<&str> = missing.iter().take(3).map(String::as_str).collect();
    if score >= 80.0 {
        Some(format!(
            "Strong alignment ({score}/100). Remaining keywords: {}.",
            top.join(", ")
        ))
    } else {
        Some(format!(
            "Weak alignment ({score}/100). Work these keywords into existing bullets: {}.",
            top.join(", ")
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmScorer — rubric-based scorer via Claude
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LlmScoreResponse {
    ats_score: f64,
    keyword_match_percentage: f64,
    #[serde(default)]
    missing_keywords: Vec<String>,
    #[serde(default)]
    critique: Option<String>,
}

/// Weighted-rubric scorer (keywords 40, skills 25, experience 20,
/// formatting 10, quantified achievements 5).
pub struct LlmScorer(pub LlmClient);

#[async_trait]
impl Scorer for LlmScorer {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn score(
        &self,
        resume: &Resume,
        requirements: &JobRequirements,
    ) -> Result<ScoreCard, ScoringError> {
        let prompt = build_score_prompt(resume, requirements);
        let response: LlmScoreResponse = self.0.call_json(&prompt, SCORE_SYSTEM).await?;

        // "APPROVED" means the reviewer has nothing left to say
        let critique = response
            .critique
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("approved"));

        Ok(ScoreCard {
            score: response.ats_score,
            keyword_match: response.keyword_match_percentage,
            missing_keywords: response.missing_keywords,
            critique,
        })
    }
}

fn build_score_prompt(resume: &Resume, requirements: &JobRequirements) -> String {
    let must_have_json = serde_json::to_string(requirements.must_have()).unwrap_or_default();
    let keywords_json = serde_json::to_string(requirements.ats_keywords()).unwrap_or_default();
    SCORE_PROMPT_TEMPLATE
        .replace("{json_only_rules}", JSON_ONLY_RULES)
        .replace("{resume_outline}", &resume_outline(resume))
        .replace("{must_have_json}", &must_have_json)
        .replace("{keywords_json}", &keywords_json)
}
