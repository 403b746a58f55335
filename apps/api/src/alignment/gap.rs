//! Gap Analyzer — measures how well a resume covers the extracted requirements.
//!
//! Pure and deterministic: the orchestrator calls it once to seed a run and again
//! before every rewrite, and identical inputs always yield an identical report.

use serde::{Deserialize, Serialize};

use crate::models::{BulletRef, JobRequirements, Resume};
use crate::text::{contains_normalized, normalize};

pub const DEFAULT_WEAK_BULLET_THRESHOLD: usize = 1;

/// A bullet that mentions too few ATS keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakBullet {
    pub location: BulletRef,
    pub text: String,
    /// Number of distinct ATS keywords found in the bullet.
    pub keyword_overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    /// matched must-haves / total must-haves, in [0, 1]. 1.0 when nothing is required.
    pub coverage: f64,
    pub matched_skills: Vec<String>,
    /// Must-haves not found anywhere in the resume, in requirement order.
    pub missing_skills: Vec<String>,
    /// ATS keywords (beyond the must-haves) not found in the resume.
    pub missing_keywords: Vec<String>,
    /// Weakest first; ties keep document order.
    pub weak_bullets: Vec<WeakBullet>,
}

impl GapReport {
    pub fn is_fully_covered(&self) -> bool {
        self.missing_skills.is_empty()
    }
}

/// Compares `resume` against `requirements`.
///
/// A requirement is matched when its normalized form occurs on token boundaries in
/// any bullet or skill entry. Bullets whose ATS keyword overlap is below
/// `weak_threshold` are reported as weak.
pub fn analyze_gaps(
    resume: &Resume,
    requirements: &JobRequirements,
    weak_threshold: usize,
) -> GapReport {
    let texts = resume.normalized_texts();
    let found = |term: &str| {
        let needle = normalize(term);
        texts.iter().any(|t| contains_normalized(t, &needle))
    };

    let (matched_skills, missing_skills): (Vec<String>, Vec<String>) = requirements
        .must_have()
        .iter()
        .cloned()
        .partition(|skill| found(skill.as_str()));

    let missing_keywords: Vec<String> = requirements
        .ats_keywords()
        .iter()
        .filter(|k| !requirements.is_must_have(k) && !found(k.as_str()))
        .cloned()
        .collect();

    let required = requirements.must_have().len();
    let coverage = if required == 0 {
        1.0
    } else {
        matched_skills.len() as f64 / required as f64
    };

    let keyword_needles: Vec<String> = requirements
        .ats_keywords()
        .iter()
        .map(|k| normalize(k))
        .collect();

    let mut weak_bullets: Vec<WeakBullet> = resume
        .bullets()
        .filter_map(|(location, text)| {
            let norm = normalize(text);
            let keyword_overlap = keyword_needles
                .iter()
                .filter(|needle| contains_normalized(&norm, needle))
                .count();
            (keyword_overlap < weak_threshold).then(|| WeakBullet {
                location,
                text: text.to_string(),
                keyword_overlap,
            })
        })
        .collect();
    // stable sort keeps document order among equal overlaps
    weak_bullets.sort_by_key(|b| b.keyword_overlap);

    GapReport {
        coverage,
        matched_skills,
        missing_skills,
        missing_keywords,
        weak_bullets,
    }
}
