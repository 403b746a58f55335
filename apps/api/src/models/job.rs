use serde::{Deserialize, Serialize};

use crate::text::{dedup_terms, normalize};

/// A target job description as supplied by the caller.
///
/// Only `title`, `company` and `description` are required; the structured lists
/// are optional hints that sharpen requirement extraction when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub title: String,
    pub company: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub preferred_qualifications: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl JobDescription {
    pub fn new(title: &str, company: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            company: company.to_string(),
            description: description.to_string(),
            location: None,
            experience_level: None,
            requirements: Vec::new(),
            responsibilities: Vec::new(),
            preferred_qualifications: Vec::new(),
            required_skills: Vec::new(),
            preferred_skills: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

/// Normalized requirements derived once per alignment run.
///
/// `ats_keywords` is always a superset of `must_have`. Display casing is the
/// first spelling seen; lookups are case- and punctuation-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequirements {
    must_have: Vec<String>,
    ats_keywords: Vec<String>,
}

impl JobRequirements {
    pub fn new<M, K>(must_have: M, keywords: K) -> Self
    where
        M: IntoIterator<Item = String>,
        K: IntoIterator<Item = String>,
    {
        let must_have = dedup_terms(must_have);
        let ats_keywords = dedup_terms(must_have.iter().cloned().chain(keywords));
        Self {
            must_have,
            ats_keywords,
        }
    }

    pub fn must_have(&self) -> &[String] {
        &self.must_have
    }

    pub fn ats_keywords(&self) -> &[String] {
        &self.ats_keywords
    }

    pub fn is_empty(&self) -> bool {
        self.ats_keywords.is_empty()
    }

    /// Returns the display spelling of `term` if it is a must-have or ATS keyword.
    pub fn canonical(&self, term: &str) -> Option<&str> {
        let key = normalize(term);
        if key.is_empty() {
            return None;
        }
        self.ats_keywords
            .iter()
            .find(|k| normalize(k) == key)
            .map(String::as_str)
    }

    pub fn is_must_have(&self, term: &str) -> bool {
        let key = normalize(term);
        self.must_have.iter().any(|k| normalize(k) == key)
    }
}
