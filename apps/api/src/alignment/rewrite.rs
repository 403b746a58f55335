//! Rewrite Engine — turns gap reports into verified, keyword-bearing resume edits.
//!
//! The text itself comes from a pluggable `RewriteBackend` (Claude in production,
//! scripted stubs in tests). The engine never trusts a backend's claims: every
//! proposed edit is checked against the resume structure and against the keywords
//! it says it adds before it becomes a `Change`.
//!
//! Guarantees on the returned resume:
//! - section ids, order and bullet counts are unchanged (bullets are only reworded)
//! - skills are only appended, only from the job's requirements, at most `max_edits`
//! - every `Change` names at least one requirement that its text really contains

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alignment::gap::GapReport;
use crate::alignment::outcome::{Change, ChangeType};
use crate::alignment::prompts::{resume_outline, REWRITE_PROMPT_TEMPLATE, REWRITE_SYSTEM};
use crate::errors::{PostConditionViolation, RewriteError};
use crate::llm_client::{
    prompts::{CLAIM_INSTRUCTION, TRUTHFULNESS_INSTRUCTION},
    LlmClient,
};
use crate::models::{BulletRef, JobRequirements, Resume};
use crate::text::{contains_term, dedup_terms, normalize};

// ────────────────────────────────────────────────────────────────────────────
// Backend contract
// ────────────────────────────────────────────────────────────────────────────

/// Everything a backend needs to propose one round of edits.
#[derive(Debug, Clone, Copy)]
pub struct RewriteRequest<'a> {
    pub resume: &'a Resume,
    pub requirements: &'a JobRequirements,
    pub gap: &'a GapReport,
    /// Upper bound on accepted changes for this call.
    pub max_edits: usize,
    /// Feedback from the previous scoring pass.
    pub critique: Option<&'a str>,
    /// Keywords the previous scoring pass reported missing.
    pub scorer_missing: &'a [String],
}

/// A backend's unverified suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedEdit {
    ReviseBullet {
        section_id: String,
        bullet_index: usize,
        revised_text: String,
        #[serde(default)]
        keywords_added: Vec<String>,
        #[serde(default)]
        reason: String,
    },
    AddSkills {
        section_id: String,
        skills: Vec<String>,
        #[serde(default)]
        reason: String,
    },
}

/// Source of proposed edits. Implement this to swap text-generation backends.
#[async_trait]
pub trait RewriteBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn propose(&self, request: &RewriteRequest<'_>) -> Result<Vec<ProposedEdit>, RewriteError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub resume: Resume,
    /// Verified changes in application order.
    pub changes: Vec<Change>,
    /// Edits dropped because they claimed keywords they do not contain.
    pub rejected: Vec<PostConditionViolation>,
}

#[derive(Clone)]
pub struct RewriteEngine {
    backend: Arc<dyn RewriteBackend>,
}

impl RewriteEngine {
    pub fn new(backend: Arc<dyn RewriteBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Asks the backend for edits and applies the ones that pass verification.
    /// `iteration` is stamped on every resulting change.
    pub async fn rewrite(
        &self,
        request: &RewriteRequest<'_>,
        iteration: u32,
    ) -> Result<RewriteOutput, RewriteError> {
        let proposals = self.backend.propose(request).await?;
        debug!(
            backend = self.backend.name(),
            proposed = proposals.len(),
            "Rewrite backend returned proposals"
        );
        apply_edits(
            request.resume,
            request.requirements,
            proposals,
            request.max_edits,
            iteration,
        )
    }
}

/// Verifies and applies `proposals` to a copy of `resume`.
///
/// Structurally broken edits (unknown section, bad index, empty text) are skipped;
/// if every proposal is broken the output is unusable. Edits whose claims fail
/// verification are recorded as violations and skipped. Stops after `max_edits`
/// accepted changes.
pub fn apply_edits(
    resume: &Resume,
    requirements: &JobRequirements,
    proposals: Vec<ProposedEdit>,
    max_edits: usize,
    iteration: u32,
) -> Result<RewriteOutput, RewriteError> {
    let mut revised = resume.clone();
    let mut changes: Vec<Change> = Vec::new();
    let mut rejected = Vec::new();
    let mut touched: HashSet<BulletRef> = HashSet::new();
    let mut skill_budget = max_edits;
    let proposed = proposals.len();
    let mut malformed = 0usize;

    for edit in proposals {
        if changes.len() >= max_edits {
            debug!(max_edits, "Change cap reached, ignoring remaining proposals");
            break;
        }

        match edit {
            ProposedEdit::ReviseBullet {
                section_id,
                bullet_index,
                revised_text,
                keywords_added,
                reason,
            } => {
                let location = BulletRef::new(&section_id, bullet_index);
                let text = revised_text.trim().to_string();

                let Some(original_text) = revised.bullet(&location).map(str::to_string) else {
                    warn!(%location, "Proposed edit targets a bullet that does not exist");
                    malformed += 1;
                    continue;
                };
                if text.is_empty() || touched.contains(&location) {
                    warn!(%location, "Proposed edit is empty or repeats a bullet");
                    malformed += 1;
                    continue;
                }

                let claimed = dedup_terms(&keywords_added);
                let keywords = match verify_claims(
                    &location.to_string(),
                    &original_text,
                    &text,
                    &claimed,
                    requirements,
                ) {
                    Ok(keywords) => keywords,
                    Err(violation) => {
                        warn!(
                            location = %violation.location,
                            claimed = ?violation.claimed,
                            "Rejected rewrite: {}",
                            violation.detail
                        );
                        rejected.push(violation);
                        continue;
                    }
                };

                revised.replace_bullet(&location, text.clone());
                touched.insert(location);
                changes.push(Change {
                    section_id,
                    bullet_index: Some(bullet_index),
                    original_text,
                    revised_text: text,
                    reason: reason_or_default(reason, &keywords),
                    keywords,
                    change_type: ChangeType::Modified,
                    iteration,
                });
            }

            ProposedEdit::AddSkills {
                section_id,
                skills,
                reason,
            } => {
                if !revised.section(&section_id).is_some_and(|s| s.is_skill_set()) {
                    warn!(%section_id, "Proposed skill addition targets a non-skills section");
                    malformed += 1;
                    continue;
                }

                let mut wanted = requirement_terms(&dedup_terms(&skills), requirements);
                if wanted.is_empty() {
                    let violation = PostConditionViolation {
                        location: section_id.clone(),
                        claimed: skills,
                        detail: "skill addition names no job requirement".to_string(),
                    };
                    warn!(location = %violation.location, "Rejected rewrite: {}", violation.detail);
                    rejected.push(violation);
                    continue;
                }
                wanted.truncate(skill_budget);

                let added = revised.add_skills(&section_id, &wanted).unwrap_or_default();
                if added.is_empty() {
                    debug!(%section_id, "Proposed skills already present");
                    continue;
                }
                skill_budget -= added.len();

                changes.push(Change {
                    section_id,
                    bullet_index: None,
                    original_text: String::new(),
                    revised_text: added.join(", "),
                    reason: reason_or_default(reason, &added),
                    keywords: added,
                    change_type: ChangeType::Added,
                    iteration,
                });
            }
        }
    }

    if proposed > 0 && malformed == proposed {
        return Err(RewriteError::Unusable(format!(
            "none of the {proposed} proposed edits reference an existing bullet or skills section"
        )));
    }
    if revised.shape() != resume.shape() {
        return Err(RewriteError::Unusable(
            "rewrite changed the resume structure".to_string(),
        ));
    }

    info!(
        accepted = changes.len(),
        rejected = rejected.len(),
        skipped = malformed,
        "Rewrite applied"
    );

    Ok(RewriteOutput {
        resume: revised,
        changes,
        rejected,
    })
}

/// A bullet edit must name at least one requirement, every keyword it claims
/// must occur in its revised text, and at least one claimed requirement must be
/// new to the bullet. Returns the requirements the edit actually adds.
fn verify_claims(
    location: &str,
    original_text: &str,
    text: &str,
    claimed: &[String],
    requirements: &JobRequirements,
) -> Result<Vec<String>, PostConditionViolation> {
    let violation = |detail: String| PostConditionViolation {
        location: location.to_string(),
        claimed: claimed.to_vec(),
        detail,
    };

    if requirement_terms(claimed, requirements).is_empty() {
        return Err(violation("edit names no job requirement".to_string()));
    }

    let absent: Vec<&str> = claimed
        .iter()
        .filter(|k| !contains_term(text, k))
        .map(String::as_str)
        .collect();
    if !absent.is_empty() {
        return Err(violation(format!(
            "revised text does not contain claimed keyword(s): {}",
            absent.join(", ")
        )));
    }

    if normalize(text) == normalize(original_text) {
        return Err(violation("revised text is unchanged".to_string()));
    }
    let added: Vec<String> = requirement_terms(claimed, requirements)
        .into_iter()
        .filter(|k| !contains_term(original_text, k))
        .collect();
    if added.is_empty() {
        return Err(violation(
            "claimed keyword(s) were already in the original bullet".to_string(),
        ));
    }
    Ok(added)
}

/// Claimed terms that are job requirements, in the requirement's own spelling.
fn requirement_terms(claimed: &[String], requirements: &JobRequirements) -> Vec<String> {
    dedup_terms(claimed.iter().filter_map(|k| requirements.canonical(k)))
}

fn reason_or_default(reason: String, keywords: &[String]) -> String {
    let reason = reason.trim();
    if reason.is_empty() {
        format!("Addresses job requirement(s): {}", keywords.join(", "))
    } else {
        reason.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmRewriter — Claude-backed proposals
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LlmRewriteResponse {
    #[serde(default)]
    edits: Vec<ProposedEdit>,
}

/// Asks Claude for truthful, keyword-bearing rewrites as structured JSON edits.
pub struct LlmRewriter(pub LlmClient);

#[async_trait]
impl RewriteBackend for LlmRewriter {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn propose(&self, request: &RewriteRequest<'_>) -> Result<Vec<ProposedEdit>, RewriteError> {
        let prompt = build_rewrite_prompt(request);
        let response: LlmRewriteResponse = self.0.call_json(&prompt, REWRITE_SYSTEM).await?;
        Ok(response.edits)
    }
}

#[derive(Serialize)]
struct WeakBulletHint<'a> {
    section_id: &'a str,
    bullet_index: usize,
    text: &'a str,
}

fn build_rewrite_prompt(request: &RewriteRequest<'_>) -> String {
    let missing = dedup_terms(
        request
            .gap
            .missing_skills
            .iter()
            .chain(&request.gap.missing_keywords)
            .chain(request.scorer_missing),
    );
    let weak: Vec<WeakBulletHint<'_>> = request
        .gap
        .weak_bullets
        .iter()
        .take(request.max_edits.saturating_mul(2).max(1))
        .map(|b| WeakBulletHint {
            section_id: &b.location.section_id,
            bullet_index: b.location.index,
            text: &b.text,
        })
        .collect();

    let missing_json = serde_json::to_string(&missing).unwrap_or_default();
    let weak_json = serde_json::to_string_pretty(&weak).unwrap_or_default();
    let keywords_json = serde_json::to_string(request.requirements.ats_keywords()).unwrap_or_default();

    REWRITE_PROMPT_TEMPLATE
        .replace("{truthfulness_instruction}", TRUTHFULNESS_INSTRUCTION)
        .replace("{claim_instruction}", CLAIM_INSTRUCTION)
        .replace("{resume_outline}", &resume_outline(request.resume))
        .replace("{missing_json}", &missing_json)
        .replace("{weak_json}", &weak_json)
        .replace("{keywords_json}", &keywords_json)
        .replace("{critique}", request.critique.unwrap_or("None"))
        .replace("{max_edits}", &request.max_edits.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::gap::analyze_gaps;
    use crate::alignment::testing::{backend_requirements, python_git_resume, revise, ScriptedRewriter};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn add_skills(skills: &[&str]) -> ProposedEdit {
        ProposedEdit::AddSkills {
            section_id: "skills".to_string(),
            skills: strings(skills),
            reason: String::new(),
        }
    }

    #[test]
    fn test_verified_revision_becomes_change() {
        let resume = python_git_resume();
        let out = apply_edits(
            &resume,
            &backend_requirements(),
            vec![revise(0, "Built REST APIs using Python and FastAPI", &["FastAPI"])],
            5,
            2,
        )
        .unwrap();

        assert_eq!(out.changes.len(), 1);
        let change = &out.changes[0];
        assert_eq!(change.section_id, "experience-0");
        assert_eq!(change.bullet_index, Some(0));
        assert_eq!(change.original_text, "Built REST APIs using Python and Flask");
        assert_eq!(change.keywords, strings(&["FastAPI"]));
        assert_eq!(change.change_type, ChangeType::Modified);
        assert_eq!(change.iteration, 2);
        assert!(change.reason.contains("FastAPI"));
        assert_eq!(out.resume.shape(), resume.shape());
        // input untouched
        assert_eq!(resume.bullet(&BulletRef::new("experience-0", 0)), Some("Built REST APIs using Python and Flask"));
    }

    #[test]
    fn test_claim_missing_from_text_is_rejected() {
        let resume = python_git_resume();
        let reqs = JobRequirements::new(strings(&["Python", "Kubernetes"]), Vec::new());
        let out = apply_edits(
            &resume,
            &reqs,
            vec![revise(1, "Collaborated with design and platform teams", &["Kubernetes"])],
            5,
            2,
        )
        .unwrap();

        assert!(out.changes.is_empty());
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].location, "experience-0[1]");
        assert_eq!(out.rejected[0].claimed, strings(&["Kubernetes"]));
        assert_eq!(out.resume, resume);
    }

    #[test]
    fn test_every_claimed_keyword_must_be_present() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![revise(0, "Built REST APIs using FastAPI", &["FastAPI", "Docker"])],
            5,
            1,
        )
        .unwrap();
        assert!(out.changes.is_empty());
        assert!(out.rejected[0].detail.contains("Docker"));
    }

    #[test]
    fn test_unchanged_bullet_is_not_a_change() {
        let resume = python_git_resume();
        let out = apply_edits(
            &resume,
            &backend_requirements(),
            vec![revise(0, "Built REST APIs using Python and Flask", &["Python"])],
            5,
            2,
        )
        .unwrap();

        assert!(out.changes.is_empty());
        assert_eq!(out.rejected.len(), 1);
        assert!(out.rejected[0].detail.contains("unchanged"));
        assert_eq!(out.resume, resume);
    }

    #[test]
    fn test_claims_already_in_original_bullet_are_rejected() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![revise(0, "Designed and built REST APIs using Python and Flask", &["Python", "REST"])],
            5,
            2,
        )
        .unwrap();

        assert!(out.changes.is_empty());
        assert!(out.rejected[0].detail.contains("already"));
    }

    #[test]
    fn test_change_records_only_newly_added_keywords() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![revise(0, "Built REST APIs using Python and FastAPI", &["Python", "FastAPI"])],
            5,
            2,
        )
        .unwrap();

        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].keywords, strings(&["FastAPI"]));
    }

    #[test]
    fn test_edit_without_requirement_is_rejected() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![revise(1, "Collaborated closely with design team", &[])],
            5,
            1,
        )
        .unwrap();
        assert!(out.changes.is_empty());
        assert_eq!(out.rejected.len(), 1);
    }

    #[test]
    fn test_all_structurally_broken_proposals_are_unusable() {
        let err = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![
                ProposedEdit::ReviseBullet {
                    section_id: "nope".to_string(),
                    bullet_index: 0,
                    revised_text: "FastAPI".to_string(),
                    keywords_added: strings(&["FastAPI"]),
                    reason: String::new(),
                },
                revise(9, "Docker", &["Docker"]),
            ],
            5,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::Unusable(_)));
    }

    #[test]
    fn test_no_proposals_is_not_an_error() {
        let out = apply_edits(&python_git_resume(), &backend_requirements(), vec![], 5, 1).unwrap();
        assert!(out.changes.is_empty());
    }

    #[test]
    fn test_cap_bounds_accepted_changes() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![
                revise(0, "Built REST APIs using Python and FastAPI", &["FastAPI"]),
                revise(2, "Deployed Docker microservices with Python on AWS", &["Docker"]),
            ],
            1,
            1,
        )
        .unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].keywords, strings(&["FastAPI"]));
    }

    #[test]
    fn test_skill_additions_limited_to_new_requirements() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![add_skills(&["docker", "Python", "Rust"])],
            5,
            1,
        )
        .unwrap();

        assert_eq!(out.changes.len(), 1);
        let change = &out.changes[0];
        assert_eq!(change.change_type, ChangeType::Added);
        assert_eq!(change.bullet_index, None);
        // canonical spelling, existing skill skipped, non-requirement dropped
        assert_eq!(change.keywords, strings(&["Docker"]));
        let skills: Vec<&str> = out.resume.skills().collect();
        assert_eq!(skills, vec!["Python", "Git", "Docker"]);
    }

    #[test]
    fn test_skill_addition_bounded_by_cap() {
        let out = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![add_skills(&["FastAPI", "Docker"])],
            1,
            1,
        )
        .unwrap();
        assert_eq!(out.changes[0].keywords, strings(&["FastAPI"]));
        assert_eq!(out.resume.skills().count(), 3);
    }

    #[test]
    fn test_skills_into_bullet_section_is_malformed() {
        let err = apply_edits(
            &python_git_resume(),
            &backend_requirements(),
            vec![ProposedEdit::AddSkills {
                section_id: "experience-0".to_string(),
                skills: strings(&["Docker"]),
                reason: String::new(),
            }],
            5,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::Unusable(_)));
    }

    #[test]
    fn test_proposed_edit_parses_tagged_json() {
        let json = r#"{"edits": [
            {"kind": "revise_bullet", "section_id": "experience-0", "bullet_index": 1,
             "revised_text": "Led Docker rollout", "keywords_added": ["Docker"], "reason": "JD"},
            {"kind": "add_skills", "section_id": "skills", "skills": ["FastAPI"]}
        ]}"#;
        let parsed: LlmRewriteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.edits.len(), 2);
        assert!(matches!(parsed.edits[1], ProposedEdit::AddSkills { .. }));
    }

    #[test]
    fn test_rewrite_prompt_merges_missing_terms_and_critique() {
        let resume = python_git_resume();
        let reqs = backend_requirements();
        let gap = analyze_gaps(&resume, &reqs, 1);
        let scorer_missing = strings(&["docker", "CI/CD"]);
        let request = RewriteRequest {
            resume: &resume,
            requirements: &reqs,
            gap: &gap,
            max_edits: 3,
            critique: Some("Mention container work"),
            scorer_missing: &scorer_missing,
        };
        let prompt = build_rewrite_prompt(&request);
        assert!(prompt.contains("[\"FastAPI\",\"Docker\",\"CI/CD\"]"));
        assert!(prompt.contains("Mention container work"));
        assert!(prompt.contains("at most 3 edits"));
        assert!(prompt.contains("\"section_id\": \"experience-0\""));
    }

    #[tokio::test]
    async fn test_engine_propagates_backend_failure() {
        let resume = python_git_resume();
        let reqs = backend_requirements();
        let gap = analyze_gaps(&resume, &reqs, 1);
        let backend = ScriptedRewriter::new(vec![Err(RewriteError::Unavailable {
            message: "overloaded".to_string(),
            retryable: true,
        })]);
        let engine = RewriteEngine::new(Arc::new(backend));
        let request = RewriteRequest {
            resume: &resume,
            requirements: &reqs,
            gap: &gap,
            max_edits: 5,
            critique: None,
            scorer_missing: &[],
        };
        let err = engine.rewrite(&request, 2).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
