// Shared prompt fragments. Each stage that calls the LLM keeps its own
// prompts next to it (see alignment/prompts.rs); only cross-cutting rules live here.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_RULES: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Truthfulness rule appended to every prompt that edits candidate text.
pub const TRUTHFULNESS_INSTRUCTION: &str = "\
    CRITICAL: Never fabricate. Only rephrase or emphasize what the resume already shows. \
    Do NOT invent employers, titles, dates, metrics or technologies the candidate has not used. \
    If a keyword cannot be worked in truthfully, leave it out.";

/// Rule that ties every claimed keyword to the revised text.
pub const CLAIM_INSTRUCTION: &str = "\
    CRITICAL: Every keyword you list in `keywords_added` must appear verbatim in `revised_text`. \
    List only keywords the original bullet did not already contain. \
    Edits whose text does not contain their claimed keywords, or that add none, are discarded.";
