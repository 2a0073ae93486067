// HTTP-backed transformer client.
//
// Calls an LLM messages endpoint with an operation-specific system
// prompt. The API key comes from the host application (it lives in the
// OS keychain, never in config files); the model id is configurable.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};

use super::{AiTransformer, TransformError};
use crate::config::AiConfig;

/// Default model when the config doesn't name one.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2_048;

const CLEANUP_PROMPT: &str = "\
You tidy up short notes. Fix formatting, spelling, and list structure.\n\
Keep the author's wording and meaning; do not add or drop information.\n\
Output ONLY the cleaned note as markdown, nothing else.";

const SUMMARIZE_PROMPT: &str = "\
You summarize short notes. Produce a compact markdown summary that\n\
preserves actionable items (checklists stay checklists).\n\
Output ONLY the summary as markdown, nothing else.";

const EXPAND_PROMPT: &str = "\
You extend short notes. Follow the user's instruction and write the\n\
additional content as markdown in the same voice as the note.\n\
Output ONLY the new or revised note content as markdown, nothing else.";

/// `AiTransformer` implementation over a messages-style HTTP API.
#[derive(Clone)]
pub struct HttpTransformer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpTransformer {
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn from_config(api_key: impl Into<String>, config: &AiConfig) -> Self {
        Self::new(api_key, config.model.clone())
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(self, system: &'static str, user: String) -> Result<String, TransformError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body(&self.model, system, &user))
            .send()
            .await
            .map_err(|error| TransformError::Service(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::Service(format!("unexpected status {status}")));
        }

        let value: Value =
            response.json().await.map_err(|error| TransformError::Service(error.to_string()))?;
        super::normalize_result(extract_text(&value))
    }
}

fn request_body(model: &str, system: &str, user: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": system,
        "messages": [{ "role": "user", "content": user }],
    })
}

/// Concatenate the text parts of a messages-API response body.
fn extract_text(value: &Value) -> String {
    value["content"]
        .as_array()
        .map(|parts| {
            parts.iter().filter_map(|part| part["text"].as_str()).collect::<Vec<_>>().join("")
        })
        .unwrap_or_default()
}

impl AiTransformer for HttpTransformer {
    fn cleanup(
        &self,
        text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let this = self.clone();
        Box::pin(this.complete(CLEANUP_PROMPT, text))
    }

    fn summarize(
        &self,
        text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let this = self.clone();
        Box::pin(this.complete(SUMMARIZE_PROMPT, text))
    }

    fn expand(
        &self,
        text: String,
        instruction: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let this = self.clone();
        let user = format!("Instruction: {instruction}\n\nNote:\n{text}");
        Box::pin(this.complete(EXPAND_PROMPT, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_applies_when_config_names_none() {
        let transformer = HttpTransformer::new("key", None);
        assert_eq!(transformer.model(), DEFAULT_MODEL);

        let transformer = HttpTransformer::new("key", Some("claude-sonnet-4-5".into()));
        assert_eq!(transformer.model(), "claude-sonnet-4-5");
    }

    #[test]
    fn from_config_picks_up_the_configured_model() {
        let config = AiConfig { model: Some("claude-haiku-4-5-20251001".into()) };
        let transformer = HttpTransformer::from_config("key", &config);
        assert_eq!(transformer.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn request_body_shape() {
        let body = request_body("m", "sys", "hello");
        assert_eq!(body["model"], "m");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn extract_text_joins_content_parts() {
        let value = serde_json::json!({
            "content": [
                { "type": "text", "text": "first " },
                { "type": "text", "text": "second" },
            ]
        });
        assert_eq!(extract_text(&value), "first second");
    }

    #[test]
    fn extract_text_tolerates_missing_content() {
        assert_eq!(extract_text(&serde_json::json!({})), "");
    }
}
