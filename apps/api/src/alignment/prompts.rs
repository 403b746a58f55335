// Prompt constants for the alignment stages that call the LLM.
// Reuses cross-cutting fragments from llm_client::prompts.

use std::fmt::Write as _;

use crate::models::{Resume, SectionContent};

/// System prompt for the rewrite stage.
pub const REWRITE_SYSTEM: &str = "You are an expert resume writer specializing in \
    applicant tracking system (ATS) optimization. You rewrite existing resume bullets so \
    they use the exact terminology of a target job, without inventing experience.";

/// Rewrite prompt template.
/// Replace: {truthfulness_instruction}, {claim_instruction}, {resume_outline},
///          {missing_json}, {weak_json}, {keywords_json}, {critique}, {max_edits}
pub const REWRITE_PROMPT_TEMPLATE: &str = r#"{truthfulness_instruction}

{claim_instruction}

CURRENT RESUME (section ids and bullet indices are authoritative):
{resume_outline}

MISSING MUST-HAVE SKILLS (address these first):
{missing_json}

WEAK BULLETS (few or no job keywords, weakest first):
{weak_json}

TARGET ATS KEYWORDS:
{keywords_json}

REVIEWER CRITIQUE FROM THE LAST SCORING PASS:
{critique}

Propose at most {max_edits} edits. Return a JSON object:
{
  "edits": [
    {
      "kind": "revise_bullet",
      "section_id": "experience-0",
      "bullet_index": 0,
      "revised_text": "Architected RESTful APIs in Python and FastAPI serving 2M requests/day",
      "keywords_added": ["FastAPI"],
      "reason": "JD requires FastAPI; candidate's API work is the closest truthful match"
    },
    {
      "kind": "add_skills",
      "section_id": "skills",
      "skills": ["Docker"],
      "reason": "Candidate deployed containers; JD lists Docker as a must-have"
    }
  ]
}

HARD RULES:
1. `section_id` and `bullet_index` MUST reference an existing bullet exactly as listed above
2. Rewrite bullets in place. NEVER delete, merge or reorder bullets or sections
3. `add_skills` may only target a skills section and only list skills from the job keywords
4. Every edit MUST name at least one job keyword in `keywords_added` (or `skills`)
5. Start bullets with strong action verbs and keep any metrics the original bullet had"#;

/// System prompt for the scoring stage.
pub const SCORE_SYSTEM: &str = "You are an ATS (Applicant Tracking System) expert \
    evaluating resume quality against a job's requirements. Score rigorously and conservatively.";

/// Scoring prompt template.
/// Replace: {json_only_rules}, {resume_outline}, {must_have_json}, {keywords_json}
pub const SCORE_PROMPT_TEMPLATE: &str = r#"{json_only_rules}

Evaluate the resume below against the job requirements and compute an ATS compatibility
score from 0 to 100 using these weighted factors:
1. Keyword match (40%): how many job keywords are present?
2. Skills alignment (25%): do the listed skills match the must-haves?
3. Experience relevance (20%): do bullets demonstrate the required work?
4. Formatting and readability (10%): clean, scannable bullets?
5. Quantifiable achievements (5%): metrics and results included?

RESUME:
{resume_outline}

MUST-HAVE SKILLS:
{must_have_json}

ATS KEYWORDS:
{keywords_json}

Return a JSON object with this EXACT schema:
{
  "ats_score": 87.5,
  "keyword_match_percentage": 82.0,
  "missing_keywords": ["Kubernetes", "CI/CD"],
  "critique": "Specific, actionable improvements, or APPROVED"
}"#;

/// Plain-text outline of a resume with section ids and bullet indices,
/// so the model can address bullets exactly.
pub fn resume_outline(resume: &Resume) -> String {
    let mut out = String::new();
    for section in &resume.sections {
        let _ = writeln!(out, "## {} (section_id: {})", section.title, section.id);
        match &section.content {
            SectionContent::Bullets(items) => {
                for (i, text) in items.iter().enumerate() {
                    let _ = writeln!(out, "  [{i}] {text}");
                }
            }
            SectionContent::Skills(items) => {
                let _ = writeln!(out, "  skills: {}", items.join(", "));
            }
        }
    }
    out
}
