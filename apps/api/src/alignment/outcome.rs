//! Records produced by an alignment run: verified changes, per-iteration results
//! and the final outcome handed to callers.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alignment::gap::GapReport;
use crate::models::{JobRequirements, Resume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// An existing bullet reworded in place.
    Modified,
    /// Skill entries appended to a skills section.
    Added,
}

/// One atomic, verified edit with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub section_id: String,
    /// `None` for skill additions.
    pub bullet_index: Option<usize>,
    pub original_text: String,
    pub revised_text: String,
    pub reason: String,
    /// Requirements this change addresses. Never empty.
    pub keywords: Vec<String>,
    pub change_type: ChangeType,
    /// Iteration whose scoring first saw this change.
    pub iteration: u32,
}

/// One SCORING pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based.
    pub iteration: u32,
    pub score: f64,
    pub keyword_match: f64,
    /// Must-have coverage of the scored resume, in [0, 1].
    pub coverage: f64,
    /// Changes applied by the rewrite that preceded this scoring.
    pub changes: Vec<Change>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
    #[serde(skip)]
    pub resume: Option<Resume>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    /// Score reached the target.
    Converged,
    /// Iteration budget spent.
    Exhausted,
    /// Score stopped improving.
    Stalled,
    /// A capability failed twice in a row.
    Failed,
    /// The caller cancelled the run.
    Cancelled,
}

impl TerminationReason {
    /// Only `Failed` is reported to callers as an error.
    pub fn is_success(self) -> bool {
        !matches!(self, TerminationReason::Failed)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::Converged => "CONVERGED",
            TerminationReason::Exhausted => "EXHAUSTED",
            TerminationReason::Stalled => "STALLED",
            TerminationReason::Failed => "FAILED",
            TerminationReason::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    /// Score of the returned resume, 0 if it was never scored.
    pub ats_score: f64,
    pub keyword_match: f64,
    pub original_coverage: f64,
    pub final_coverage: f64,
    /// Iteration whose scored resume was returned, 0 for the unscored original.
    pub returned_iteration: u32,
    /// Changes present in the returned resume.
    pub total_changes: usize,
    pub sections_modified: usize,
    pub iterations: usize,
    /// Proposed edits dropped because their text lacked the claimed keywords.
    pub rejected_claims: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignmentOutcome {
    pub run_id: Uuid,
    pub resume: Resume,
    pub original_resume: Resume,
    pub requirements: JobRequirements,
    pub initial_gap: GapReport,
    pub final_gap: GapReport,
    /// Every verified change in application order. A failed or cancelled run
    /// may return an earlier snapshot; see `applied_changes`.
    pub changes: Vec<Change>,
    pub iterations: Vec<IterationResult>,
    pub termination: TerminationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub metrics: AlignmentMetrics,
}

impl AlignmentOutcome {
    pub fn is_success(&self) -> bool {
        self.termination.is_success()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.iterations.iter().map(|i| i.score).collect()
    }

    /// Changes present in `resume`, a prefix of `changes`.
    pub fn applied_changes(&self) -> &[Change] {
        applied_changes(&self.changes, self.metrics.returned_iteration)
    }
}

/// Prefix of the change log already present after `iteration` was scored.
pub fn applied_changes(changes: &[Change], iteration: u32) -> &[Change] {
    let end = changes.partition_point(|c| c.iteration <= iteration);
    &changes[..end]
}

/// Number of distinct sections touched by `changes`.
pub fn sections_modified(changes: &[Change]) -> usize {
    changes
        .iter()
        .map(|c| c.section_id.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}
