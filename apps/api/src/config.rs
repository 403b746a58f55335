use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::alignment::orchestrator::RefinementConfig;

/// Which scoring backend the orchestrator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerBackend {
    Keyword,
    Llm,
}

impl FromStr for ScorerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(ScorerBackend::Keyword),
            "llm" => Ok(ScorerBackend::Llm),
            other => bail!("SCORER_BACKEND must be 'keyword' or 'llm', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or refinement settings are invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub llm_max_concurrency: usize,
    pub scorer_backend: ScorerBackend,
    pub latex_engine: String,
    pub refinement: RefinementConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RefinementConfig::default();
        let refinement = RefinementConfig {
            target_score: env_or("ALIGN_TARGET_SCORE", defaults.target_score)?,
            max_iterations: env_or("ALIGN_MAX_ITERATIONS", defaults.max_iterations)?,
            call_timeout: Duration::from_secs(env_or(
                "ALIGN_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            change_cap: env_or("ALIGN_CHANGE_CAP", defaults.change_cap)?,
            stall_threshold: env_or("ALIGN_STALL_THRESHOLD", defaults.stall_threshold)?,
            weak_bullet_threshold: env_or(
                "ALIGN_WEAK_BULLET_THRESHOLD",
                defaults.weak_bullet_threshold,
            )?,
            min_description_chars: env_or("ALIGN_MIN_JD_CHARS", defaults.min_description_chars)?,
        };
        refinement
            .validate()
            .context("Invalid ALIGN_* refinement settings")?;

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            llm_max_concurrency: env_or("LLM_MAX_CONCURRENCY", 4)?,
            scorer_backend: env_or("SCORER_BACKEND", ScorerBackend::Keyword)?,
            latex_engine: std::env::var("LATEX_ENGINE").unwrap_or_else(|_| "pdflatex".to_string()),
            refinement,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses `key` if set, otherwise returns `default`.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_backend_parses_case_insensitively() {
        assert_eq!("keyword".parse::<ScorerBackend>().unwrap(), ScorerBackend::Keyword);
        assert_eq!(" LLM ".parse::<ScorerBackend>().unwrap(), ScorerBackend::Llm);
        assert!("semantic".parse::<ScorerBackend>().is_err());
    }

    #[test]
    fn test_parse_value_reports_key_on_error() {
        assert_eq!(parse_value::<u32>("ALIGN_MAX_ITERATIONS", " 7 ").unwrap(), 7);
        let err = parse_value::<f64>("ALIGN_TARGET_SCORE", "ninety").unwrap_err();
        assert!(err.to_string().contains("ALIGN_TARGET_SCORE"));
    }

    #[test]
    fn test_unset_variable_falls_back_to_default() {
        let value: usize = env_or("ALIGNCV_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
