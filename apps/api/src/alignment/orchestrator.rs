//! Refinement Orchestrator — the alignment state machine.
//!
//! ```text
//! SEEDED → SCORING → DECIDING ─┬→ REWRITING → SCORING …
//!                              ├→ CONVERGED   score ≥ target
//!                              ├→ EXHAUSTED   iteration budget spent
//!                              ├→ STALLED     no improvement for `stall_threshold` scorings
//!                              └→ CANCELLED   caller cancelled
//! SCORING / REWRITING ──(second failure)──→ FAILED
//! ```
//!
//! The loop is strictly sequential per run. Control decisions depend only on the
//! score history (`decide`), so a fixed sequence of observations always takes the
//! same path. Every capability call runs under a per-call timeout, is retried at
//! most once, and races the run's `CancellationToken`; results of an aborted call
//! are dropped before they reach the change log.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::ensure;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alignment::gap::{analyze_gaps, GapReport, DEFAULT_WEAK_BULLET_THRESHOLD};
use crate::alignment::outcome::{
    applied_changes, sections_modified, AlignmentMetrics, AlignmentOutcome, Change, IterationResult,
    TerminationReason,
};
use crate::alignment::requirements::{RequirementExtractor, DEFAULT_MIN_DESCRIPTION_CHARS};
use crate::alignment::rewrite::{RewriteBackend, RewriteEngine, RewriteOutput, RewriteRequest};
use crate::alignment::scorer::{ScoreCard, Scorer};
use crate::errors::{ExtractionError, RewriteError, ScoringError};
use crate::models::{JobDescription, JobRequirements, Resume};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    /// Score at or above which a run converges, 0 – 100.
    pub target_score: f64,
    /// Maximum number of scorings per run, ≥ 1.
    pub max_iterations: u32,
    /// Deadline for a single rewrite or scoring call.
    pub call_timeout: Duration,
    /// Maximum accepted changes per rewrite call, ≥ 1.
    pub change_cap: usize,
    /// Consecutive non-improving scorings that stall a run, ≥ 1.
    pub stall_threshold: u32,
    pub weak_bullet_threshold: usize,
    pub min_description_chars: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            target_score: 90.0,
            max_iterations: 5,
            call_timeout: Duration::from_secs(60),
            change_cap: 5,
            stall_threshold: 2,
            weak_bullet_threshold: DEFAULT_WEAK_BULLET_THRESHOLD,
            min_description_chars: DEFAULT_MIN_DESCRIPTION_CHARS,
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.target_score.is_finite() && (0.0..=100.0).contains(&self.target_score),
            "target_score must be within 0–100, got {}",
            self.target_score
        );
        ensure!(self.max_iterations >= 1, "max_iterations must be at least 1");
        ensure!(!self.call_timeout.is_zero(), "call_timeout must be positive");
        ensure!(self.change_cap >= 1, "change_cap must be at least 1");
        ensure!(self.stall_threshold >= 1, "stall_threshold must be at least 1");
        Ok(())
    }

    /// Cap used for the single retry after a failed rewrite.
    pub fn reduced_change_cap(&self) -> usize {
        (self.change_cap / 2).max(1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decision function
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Converged,
    Exhausted,
    Stalled,
    Rewrite,
}

/// Stop conditions in priority order: converged, exhausted, stalled.
/// `scores` is the full score history of the run, oldest first.
pub fn decide(config: &RefinementConfig, scores: &[f64]) -> Decision {
    let Some(&latest) = scores.last() else {
        return Decision::Rewrite;
    };

    if latest >= config.target_score {
        return Decision::Converged;
    }
    if scores.len() >= config.max_iterations as usize {
        return Decision::Exhausted;
    }
    if non_improving_streak(scores) >= config.stall_threshold as usize {
        return Decision::Stalled;
    }
    Decision::Rewrite
}

/// Number of trailing scorings that did not beat their predecessor.
fn non_improving_streak(scores: &[f64]) -> usize {
    scores
        .windows(2)
        .rev()
        .take_while(|pair| pair[1] <= pair[0])
        .count()
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Seeded,
    Scoring,
    Deciding,
    Rewriting,
    Finished(TerminationReason),
}

/// Why a guarded capability call produced no result.
enum CallError<E> {
    Cancelled,
    Failed(E),
}

/// Mutable bookkeeping for one run.
struct RunLog {
    current: Resume,
    /// Changes from the last rewrite, appended once that resume has been scored.
    pending: Vec<Change>,
    changes: Vec<Change>,
    iterations: Vec<IterationResult>,
    last_card: Option<ScoreCard>,
    rejected_claims: usize,
    error: Option<String>,
}

impl RunLog {
    fn scores(&self) -> Vec<f64> {
        self.iterations.iter().map(|i| i.score).collect()
    }

    /// Highest-scoring snapshot, latest on ties.
    fn best(&self) -> Option<&IterationResult> {
        self.iterations
            .iter()
            .filter(|i| i.resume.is_some())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    config: RefinementConfig,
    extractor: RequirementExtractor,
    engine: RewriteEngine,
    scorer: Arc<dyn Scorer>,
}

impl Orchestrator {
    pub fn new(
        config: RefinementConfig,
        rewriter: Arc<dyn RewriteBackend>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            extractor: RequirementExtractor::new(config.min_description_chars),
            engine: RewriteEngine::new(rewriter),
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn extractor(&self) -> &RequirementExtractor {
        &self.extractor
    }

    /// Extracts requirements from `job`, then runs the refinement loop.
    /// Fails only when the job description cannot seed a run.
    pub async fn align(
        &self,
        resume: Resume,
        job: &JobDescription,
        cancel: &CancellationToken,
    ) -> Result<AlignmentOutcome, ExtractionError> {
        let requirements = self.extractor.extract(job)?;
        Ok(self.run(resume, requirements, cancel).await)
    }

    /// Runs the refinement loop to a terminal state. Always yields an outcome.
    pub async fn run(
        &self,
        resume: Resume,
        requirements: JobRequirements,
        cancel: &CancellationToken,
    ) -> AlignmentOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let initial_gap = analyze_gaps(&resume, &requirements, self.config.weak_bullet_threshold);
        let mut log = RunLog {
            current: resume.clone(),
            pending: Vec::new(),
            changes: Vec::new(),
            iterations: Vec::new(),
            last_card: None,
            rejected_claims: 0,
            error: None,
        };

        let mut state = RunState::Seeded;
        let termination = loop {
            state = match state {
                RunState::Seeded => {
                    info!(
                        %run_id,
                        coverage = initial_gap.coverage,
                        missing = initial_gap.missing_skills.len(),
                        rewriter = self.engine.backend_name(),
                        scorer = self.scorer.name(),
                        "Alignment run seeded"
                    );
                    RunState::Scoring
                }

                RunState::Scoring => self.score_step(run_id, &mut log, &requirements, cancel).await,

                RunState::Deciding => {
                    if cancel.is_cancelled() {
                        RunState::Finished(TerminationReason::Cancelled)
                    } else {
                        match decide(&self.config, &log.scores()) {
                            Decision::Converged => RunState::Finished(TerminationReason::Converged),
                            Decision::Exhausted => RunState::Finished(TerminationReason::Exhausted),
                            Decision::Stalled => RunState::Finished(TerminationReason::Stalled),
                            Decision::Rewrite => RunState::Rewriting,
                        }
                    }
                }

                RunState::Rewriting => {
                    self.rewrite_step(run_id, &mut log, &requirements, cancel).await
                }

                RunState::Finished(reason) => break reason,
            };
            debug!(%run_id, ?state, "State transition");
        };

        self.finish(
            run_id,
            termination,
            log,
            resume,
            requirements,
            initial_gap,
            started_at,
            clock,
        )
    }

    async fn score_step(
        &self,
        run_id: Uuid,
        log: &mut RunLog,
        requirements: &JobRequirements,
        cancel: &CancellationToken,
    ) -> RunState {
        let iteration = log.iterations.len() as u32 + 1;

        let card = match self.score_with_retry(&log.current, requirements, cancel).await {
            Ok(card) => card,
            Err(CallError::Cancelled) => {
                log.pending.clear();
                return RunState::Finished(TerminationReason::Cancelled);
            }
            Err(CallError::Failed(e)) => {
                warn!(%run_id, iteration, error = %e, "Scoring failed after retry");
                log.pending.clear();
                log.error = Some(e.to_string());
                return RunState::Finished(TerminationReason::Failed);
            }
        };

        let coverage =
            analyze_gaps(&log.current, requirements, self.config.weak_bullet_threshold).coverage;
        let changes = std::mem::take(&mut log.pending);
        log.changes.extend(changes.iter().cloned());

        info!(
            %run_id,
            iteration,
            score = card.score,
            keyword_match = card.keyword_match,
            coverage,
            changes = changes.len(),
            "Iteration scored"
        );

        log.iterations.push(IterationResult {
            iteration,
            score: card.score,
            keyword_match: card.keyword_match,
            coverage,
            changes,
            critique: card.critique.clone(),
            resume: Some(log.current.clone()),
        });
        log.last_card = Some(card);
        RunState::Deciding
    }

    async fn rewrite_step(
        &self,
        run_id: Uuid,
        log: &mut RunLog,
        requirements: &JobRequirements,
        cancel: &CancellationToken,
    ) -> RunState {
        // changes are stamped with the iteration whose scoring will see them
        let iteration = log.iterations.len() as u32 + 1;
        let gap = analyze_gaps(&log.current, requirements, self.config.weak_bullet_threshold);
        let request = RewriteRequest {
            resume: &log.current,
            requirements,
            gap: &gap,
            max_edits: self.config.change_cap,
            critique: log.last_card.as_ref().and_then(|c| c.critique.as_deref()),
            scorer_missing: log
                .last_card
                .as_ref()
                .map(|c| c.missing_keywords.as_slice())
                .unwrap_or(&[]),
        };

        match self.rewrite_with_retry(request, iteration, cancel).await {
            Ok(output) => {
                if !output.rejected.is_empty() {
                    warn!(
                        %run_id,
                        iteration,
                        rejected = output.rejected.len(),
                        "Rewrite claims failed verification"
                    );
                }
                log.rejected_claims += output.rejected.len();
                log.current = output.resume;
                log.pending = output.changes;
                RunState::Scoring
            }
            Err(CallError::Cancelled) => RunState::Finished(TerminationReason::Cancelled),
            Err(CallError::Failed(e)) => {
                warn!(%run_id, iteration, error = %e, "Rewrite failed after retry");
                log.error = Some(e.to_string());
                RunState::Finished(TerminationReason::Failed)
            }
        }
    }

    async fn score_with_retry(
        &self,
        resume: &Resume,
        requirements: &JobRequirements,
        cancel: &CancellationToken,
    ) -> Result<ScoreCard, CallError<ScoringError>> {
        let attempt = || {
            guarded(self.config.call_timeout, cancel, ScoringError::Timeout, async move {
                self.scorer
                    .score(resume, requirements)
                    .await
                    .and_then(ScoreCard::validate)
            })
        };

        match attempt().await {
            Err(CallError::Failed(e)) if e.is_retryable() => {
                warn!(error = %e, "Scoring failed, retrying once");
                attempt().await
            }
            other => other,
        }
    }

    async fn rewrite_with_retry(
        &self,
        request: RewriteRequest<'_>,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Result<RewriteOutput, CallError<RewriteError>> {
        let attempt = |max_edits: usize| {
            let request = RewriteRequest {
                max_edits,
                ..request
            };
            guarded(self.config.call_timeout, cancel, RewriteError::Timeout, async move {
                self.engine.rewrite(&request, iteration).await
            })
        };

        match attempt(request.max_edits).await {
            Err(CallError::Failed(e)) if e.is_retryable() => {
                let reduced = self.config.reduced_change_cap();
                warn!(error = %e, reduced_cap = reduced, "Rewrite failed, retrying once with a reduced cap");
                attempt(reduced).await
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run_id: Uuid,
        termination: TerminationReason,
        log: RunLog,
        original: Resume,
        requirements: JobRequirements,
        initial_gap: GapReport,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> AlignmentOutcome {
        // Successful runs return the latest resume; failed or cancelled runs
        // fall back to the best-scoring snapshot.
        let (resume, returned) = match termination {
            TerminationReason::Failed | TerminationReason::Cancelled => match log.best() {
                Some(best) => (best.resume.clone().unwrap_or_else(|| original.clone()), Some(best)),
                None => (original.clone(), None),
            },
            _ => (log.current.clone(), log.iterations.last()),
        };
        let (ats_score, keyword_match, returned_iteration) = returned
            .map(|i| (i.score, i.keyword_match, i.iteration))
            .unwrap_or((0.0, 0.0, 0));
        let applied = applied_changes(&log.changes, returned_iteration);
        if applied.len() < log.changes.len() {
            info!(
                %run_id,
                returned_iteration,
                dropped = log.changes.len() - applied.len(),
                "Returning earlier snapshot; later changes are not in the returned resume"
            );
        }

        let final_gap = analyze_gaps(&resume, &requirements, self.config.weak_bullet_threshold);
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        let metrics = AlignmentMetrics {
            ats_score,
            keyword_match,
            original_coverage: initial_gap.coverage,
            final_coverage: final_gap.coverage,
            returned_iteration,
            total_changes: applied.len(),
            sections_modified: sections_modified(applied),
            iterations: log.iterations.len(),
            rejected_claims: log.rejected_claims,
            processing_time_ms: elapsed_ms,
        };

        info!(
            %run_id,
            termination = %termination,
            iterations = metrics.iterations,
            changes = metrics.total_changes,
            ats_score,
            elapsed_ms,
            "Alignment run finished"
        );

        AlignmentOutcome {
            run_id,
            resume,
            original_resume: original,
            requirements,
            initial_gap,
            final_gap,
            changes: log.changes,
            iterations: log.iterations,
            termination,
            error: log.error,
            started_at,
            elapsed_ms,
            metrics,
        }
    }
}

/// Runs `fut` under `timeout`, abandoning it if `cancel` fires first.
async fn guarded<T, E, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    on_timeout: fn(Duration) -> E,
    fut: F,
) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CallError::Cancelled),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CallError::Failed(e)),
            Err(_) => Err(CallError::Failed(on_timeout(timeout))),
        },
    }
}
