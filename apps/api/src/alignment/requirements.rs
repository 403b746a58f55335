//! Requirement Extractor — derives must-have skills and ATS keywords from a job description.
//!
//! Deterministic and LLM-free: extraction runs once per alignment and its output
//! anchors every later stage, so it must be reproducible and fail loudly on thin input.

use tracing::info;

use crate::errors::ExtractionError;
use crate::models::{JobDescription, JobRequirements};
use crate::text::{contains_normalized, normalize};

pub const DEFAULT_MIN_DESCRIPTION_CHARS: usize = 50;

/// Requirement phrases longer than this are prose, not keywords.
const MAX_PHRASE_WORDS: usize = 4;

/// Concrete technologies. Eligible as must-haves when the JD lists no skills itself.
const TECH_VOCABULARY: &[&str] = &[
    "Python", "Java", "JavaScript", "TypeScript", "Golang", "Rust", "C++", "C#", "Ruby",
    "PHP", "Kotlin", "Scala", "SQL", "NoSQL", "PostgreSQL", "MySQL", "MongoDB", "Redis",
    "Elasticsearch", "Kafka", "RabbitMQ", "Docker", "Kubernetes", "Terraform", "Ansible",
    "AWS", "GCP", "Azure", "Linux", "Git", "CI/CD", "Jenkins", "GitHub Actions", "REST",
    "RESTful", "GraphQL", "gRPC", "FastAPI", "Django", "Flask", "Spring Boot", "Node.js",
    "React", "Angular", "Vue", "Next.js", "HTML", "CSS", "PyTorch", "TensorFlow", "Pandas",
    "NumPy", "Spark", "Airflow", "Snowflake", "Tableau", "Prometheus", "Grafana", "OAuth",
    "ETL", "Jira", "Figma",
];

/// Practices and soft skills. Scanned into ATS keywords only.
const PRACTICE_VOCABULARY: &[&str] = &[
    "microservices", "distributed systems", "system design", "machine learning",
    "deep learning", "data pipelines", "serverless", "observability", "DevOps", "Agile",
    "Scrum", "TDD", "unit testing", "code review", "API", "scalable", "high availability",
    "leadership", "mentoring", "communication", "cross-functional",
];

/// Leading boilerplate, as normalized word sequences. Longest first.
const LEADING_BOILERPLATE: &[&str] = &[
    "hands on experience with",
    "working knowledge of",
    "professional experience with",
    "experience working with",
    "experience with",
    "experience in",
    "experience using",
    "proficiency in",
    "proficiency with",
    "proficient in",
    "proficient with",
    "knowledge of",
    "familiarity with",
    "familiar with",
    "expertise in",
    "expertise with",
    "understanding of",
    "ability to",
    "must have",
    "nice to have",
    "required",
    "preferred",
    "bonus",
    "an",
    "a",
];

/// Qualifiers dropped only in front of leading boilerplate ("strong knowledge of").
/// On their own they are part of skill names such as "Deep Learning".
const LEADING_QUALIFIERS: &[&str] = &["strong", "solid", "deep", "excellent", "good"];

const TRAILING_BOILERPLATE: &[&str] = &[
    "is a plus",
    "a plus",
    "is required",
    "is preferred",
    "nice to have",
    "or similar",
    "or equivalent",
    "required",
    "preferred",
];

/// Trailing nouns dropped only when what remains is a known term
/// ("Python experience", but not "User Experience").
const TRAILING_NOUNS: &[&str] = &["experience"];

/// Builds `JobRequirements` from a `JobDescription`.
#[derive(Debug, Clone)]
pub struct RequirementExtractor {
    min_description_chars: usize,
}

impl Default for RequirementExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DESCRIPTION_CHARS)
    }
}

impl RequirementExtractor {
    pub fn new(min_description_chars: usize) -> Self {
        Self {
            min_description_chars,
        }
    }

    /// Extracts requirements.
    ///
    /// Must-haves are the JD's own `required_skills` (boilerplate stripped) when
    /// present; otherwise technologies found in the requirement lines and description.
    /// ATS keywords add preferred skills, explicit keywords, short requirement phrases
    /// and every vocabulary term found anywhere in the posting.
    pub fn extract(&self, jd: &JobDescription) -> Result<JobRequirements, ExtractionError> {
        let description = jd.description.trim();
        if description.is_empty() {
            return Err(ExtractionError::EmptyDescription);
        }
        let len = description.chars().count();
        if len < self.min_description_chars {
            return Err(ExtractionError::InsufficientText {
                len,
                min: self.min_description_chars,
            });
        }

        let must_have: Vec<String> = if jd.required_skills.is_empty() {
            let scope = jd
                .requirements
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(description))
                .collect::<Vec<_>>()
                .join("\n");
            vocabulary_hits(&scope, TECH_VOCABULARY)
        } else {
            jd.required_skills
                .iter()
                .filter_map(|s| strip_boilerplate(s))
                .collect()
        };

        let posting = std::iter::once(jd.title.as_str())
            .chain(std::iter::once(description))
            .chain(jd.requirements.iter().map(String::as_str))
            .chain(jd.responsibilities.iter().map(String::as_str))
            .chain(jd.preferred_qualifications.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n");

        let mut keywords: Vec<String> = jd
            .preferred_skills
            .iter()
            .chain(jd.keywords.iter())
            .filter_map(|s| strip_boilerplate(s))
            .collect();
        keywords.extend(
            jd.requirements
                .iter()
                .chain(jd.preferred_qualifications.iter())
                .flat_map(|line| split_items(line))
                .filter_map(|item| strip_boilerplate(&item))
                .filter(|phrase| phrase.split_whitespace().count() <= MAX_PHRASE_WORDS),
        );
        keywords.extend(vocabulary_hits(&posting, TECH_VOCABULARY));
        keywords.extend(vocabulary_hits(&posting, PRACTICE_VOCABULARY));

        let requirements = JobRequirements::new(must_have, keywords);
        if requirements.is_empty() {
            return Err(ExtractionError::NoRequirements);
        }

        info!(
            title = %jd.title,
            company = %jd.company,
            must_have = requirements.must_have().len(),
            ats_keywords = requirements.ats_keywords().len(),
            "Extracted job requirements"
        );

        Ok(requirements)
    }
}

/// Vocabulary terms present in `text`, ordered by first occurrence.
fn vocabulary_hits(text: &str, vocabulary: &[&str]) -> Vec<String> {
    let padded = format!(" {} ", normalize(text));
    let mut hits: Vec<(usize, &str)> = vocabulary
        .iter()
        .filter_map(|term| {
            let needle = normalize(term);
            if !contains_normalized(padded.trim(), &needle) {
                return None;
            }
            padded
                .find(&format!(" {needle} "))
                .map(|pos| (pos, *term))
        })
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);
    hits.into_iter().map(|(_, term)| term.to_string()).collect()
}

/// Splits a requirement line into candidate items on `,` `;` and the words "and" / "or".
fn split_items(line: &str) -> Vec<String> {
    let mut items = Vec::new();
    for part in line.split([',', ';']) {
        let mut current: Vec<&str> = Vec::new();
        for word in part.split_whitespace() {
            if matches!(normalize(word).as_str(), "and" | "or" | "") {
                if !current.is_empty() {
                    items.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(word);
            }
        }
        if !current.is_empty() {
            items.push(current.join(" "));
        }
    }
    items
}

/// Removes hiring boilerplate around a skill phrase, keeping the original casing.
/// Returns `None` when nothing meaningful is left.
pub fn strip_boilerplate(phrase: &str) -> Option<String> {
    let without_parens = remove_parentheticals(phrase);
    let mut words: Vec<&str> = without_parens.split_whitespace().collect();

    loop {
        let before = words.len();
        strip_years_prefix(&mut words);
        strip_qualifier(&mut words);
        strip_sequence(&mut words, LEADING_BOILERPLATE, true);
        strip_sequence(&mut words, TRAILING_BOILERPLATE, false);
        strip_trailing_noun(&mut words);
        if words.len() == before {
            break;
        }
    }

    let joined = words.join(" ");
    let trimmed = joined.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | ' '));
    if normalize(trimmed).is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn remove_parentheticals(phrase: &str) -> String {
    let mut out = String::with_capacity(phrase.len());
    let mut depth = 0usize;
    for ch in phrase.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Drops "5+ years of", "3-5 years", "2 yrs" style prefixes.
fn strip_years_prefix(words: &mut Vec<&str>) {
    if words.len() < 2 {
        return;
    }
    let starts_numeric = words[0].chars().next().is_some_and(|c| c.is_ascii_digit());
    let unit = normalize(words[1]);
    if starts_numeric && (unit.starts_with("year") || unit.starts_with("yr")) {
        words.drain(..2);
        if words.first().is_some_and(|w| normalize(w) == "of") {
            words.remove(0);
        }
    }
}

fn strip_qualifier(words: &mut Vec<&str>) {
    let Some(first) = words.first() else {
        return;
    };
    if !LEADING_QUALIFIERS.contains(&normalize(first).as_str()) {
        return;
    }
    let mut rest = words[1..].to_vec();
    let before = rest.len();
    strip_sequence(&mut rest, LEADING_BOILERPLATE, true);
    if rest.len() < before {
        words.remove(0);
    }
}

fn strip_trailing_noun(words: &mut Vec<&str>) {
    if words.len() < 2 {
        return;
    }
    let Some(last) = words.last() else {
        return;
    };
    if !TRAILING_NOUNS.contains(&normalize(last).as_str()) {
        return;
    }
    let remaining = normalize(&words[..words.len() - 1].join(" "));
    let known = TECH_VOCABULARY
        .iter()
        .chain(PRACTICE_VOCABULARY)
        .any(|term| normalize(term) == remaining);
    if known {
        words.pop();
    }
}

/// Strips the first matching boilerplate sequence from the front or back of `words`.
fn strip_sequence(words: &mut Vec<&str>, sequences: &[&str], leading: bool) {
    for seq in sequences {
        let seq_words: Vec<&str> = seq.split(' ').collect();
        let n = seq_words.len();
        if words.len() < n {
            continue;
        }
        let window = if leading {
            &words[..n]
        } else {
            &words[words.len() - n..]
        };
        if window.iter().zip(&seq_words).all(|(w, s)| normalize(w) == *s) {
            if leading {
                words.drain(..n);
            } else {
                words.truncate(words.len() - n);
            }
            return;
        }
    }
}
