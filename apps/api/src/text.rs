//! Text normalization shared by the document model and every alignment stage.
//!
//! All keyword comparisons in the service go through `normalize`, so "FastAPI",
//! "fastapi," and "FASTAPI." compare equal while "Go" never matches inside "good".

use std::collections::HashSet;

/// Lowercases, maps punctuation to spaces and collapses whitespace.
///
/// `+` and `#` survive so that "C++" and "C#" stay distinct from "C".
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '+' || ch == '#' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// True if `needle_norm` occurs in `haystack_norm` on token boundaries.
/// Both arguments must already be normalized.
pub fn contains_normalized(haystack_norm: &str, needle_norm: &str) -> bool {
    if needle_norm.is_empty() || haystack_norm.is_empty() {
        return false;
    }
    format!(" {haystack_norm} ").contains(&format!(" {needle_norm} "))
}

/// Convenience wrapper: normalizes both sides, then matches on token boundaries.
pub fn contains_term(text: &str, term: &str) -> bool {
    contains_normalized(&normalize(text), &normalize(term))
}

/// Trims, drops empties, and removes case/punctuation-insensitive duplicates.
/// The first spelling seen is the one kept for display.
pub fn dedup_terms<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for item in items {
        let trimmed = item.as_ref().trim();
        let key = normalize(trimmed);
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  FastAPI, Docker!  "), "fastapi docker");
        assert_eq!(normalize("CI/CD"), "ci cd");
        assert_eq!(normalize("Node.js"), "node js");
    }

    #[test]
    fn test_normalize_keeps_plus_and_hash() {
        assert_eq!(normalize("C++"), "c++");
        assert_eq!(normalize("C#"), "c#");
    }

    #[test]
    fn test_contains_term_respects_token_boundaries() {
        assert!(contains_term("Built services in Go and Rust", "go"));
        assert!(!contains_term("Delivered good results", "Go"));
        assert!(contains_term("Shipped REST APIs with FastAPI.", "fastapi"));
        assert!(contains_term("Ran CI/CD pipelines", "ci/cd"));
    }

    #[test]
    fn test_contains_term_empty_needle_never_matches() {
        assert!(!contains_term("anything", "  "));
        assert!(!contains_term("", "rust"));
    }

    #[test]
    fn test_dedup_terms_keeps_first_casing() {
        let out = dedup_terms(["Python", "python", " PYTHON ", "Docker", "", "docker."]);
        assert_eq!(out, vec!["Python".to_string(), "Docker".to_string()]);
    }
}
