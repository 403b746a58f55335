/// LLM Client — the single point of entry for all Claude API calls in AlignCV.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Rewrite and scoring backends go through this client; the refinement loop owns
/// timeouts and the one-retry policy, so the client makes exactly one attempt per call.
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in AlignCV.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
/// Upper bound on a single HTTP exchange. Callers apply their own, shorter deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM client is shutting down")]
    Closed,

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// Rate limits, overload, transport failures and malformed output are worth
    /// one more attempt; other 4xx responses (bad key, bad request) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Closed => false,
            LlmError::Http(_) | LlmError::Parse(_) | LlmError::EmptyContent => true,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Shared LLM client. Cheap to clone; clones share the HTTP pool and the
/// concurrency limit, so concurrent alignment runs cannot flood the API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    permits: Arc<Semaphore>,
}

impl LlmClient {
    pub fn new(api_key: String, max_concurrency: usize) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        })
    }

    /// Makes a single call to the Claude API, returning the full response object.
    /// Waits for a concurrency permit first; the permit is released when the call ends.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let _permit = self.permits.acquire().await.map_err(|_| LlmError::Closed)?;

        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "LLM API call failed: {message}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            input_tokens = llm_response.usage.input_tokens,
            output_tokens = llm_response.usage.output_tokens,
            "LLM call succeeded"
        );

        Ok(llm_response)
    }

    /// Calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(prompt, system).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;
        let text = strip_json_fences(text);
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));

    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or(stripped)
        }
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"edits\": []}\n```";
        assert_eq!(strip_json_fences(input), "{\"edits\": []}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"ats_score\": 81.5}\n```";
        assert_eq!(strip_json_fences(input), "{\"ats_score\": 81.5}");
    }

    #[test]
    fn test_strip_json_fences_unterminated() {
        let input = "```json\n{\"edits\": []}";
        assert_eq!(strip_json_fences(input), "{\"edits\": []}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"edits\": []}  ";
        assert_eq!(strip_json_fences(input), "{\"edits\": []}");
    }

    #[test]
    fn test_rate_limit_is_retryable_but_bad_request_is_not() {
        let limited = LlmError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        let bad = LlmError::Api {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(limited.is_retryable());
        assert!(!bad.is_retryable());
        assert!(!LlmError::Closed.is_retryable());
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let json = r#"{
            "content": [
                {"type": "tool_use", "text": null},
                {"type": "text", "text": "{\"ok\": true}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let response: LlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("{\"ok\": true}"));
    }
}
