// Resume alignment pipeline
// Implements: requirement extraction, gap analysis, verified rewriting, scoring,
// and the refinement state machine that drives them.
// All LLM calls go through llm_client. No direct Anthropic API calls here.

pub mod gap;
pub mod handlers;
pub mod orchestrator;
pub mod outcome;
pub mod prompts;
pub mod requirements;
pub mod rewrite;
pub mod scorer;

#[cfg(test)]
pub(crate) mod testing;
