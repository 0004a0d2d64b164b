use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tracing::{debug, info, warn};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// A vision-language service: send instructions plus one PNG, get raw text back
pub trait VisionProvider {
    fn name(&self) -> &str;

    fn submit(&self, prompt: &str, image_png: &[u8]) -> impl Future<Output = anyhow::Result<String>>;
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// OpenAI chat completions with an inline image
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// # Arguments
    /// * `api_key` - OpenAI API key (from OPENAI_API_KEY environment variable)
    /// * `model` - Model to use (default: "gpt-4o")
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
        }
    }

    pub fn from_env(model: Option<String>) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    fn request_body(&self, prompt: &str, image_png: &[u8]) -> serde_json::Value {
        let b64_image = general_purpose::STANDARD.encode(image_png);

        let mut request_body = serde_json::json!({
            "model": self.model.clone(),
            "temperature": 0.0,
            "messages": vec![serde_json::json!({
                "role": "user",
                "content": vec![
                    serde_json::json!({
                        "type": "text",
                        "text": prompt
                    }),
                    serde_json::json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", b64_image)
                        }
                    })
                ]
            })]
        });

        // Use max_completion_tokens for newer models, max_tokens for older ones
        if self.model.starts_with("gpt-5") || self.model.starts_with("o1") {
            request_body["max_completion_tokens"] = serde_json::json!(MAX_TOKENS);
            // Reasoning models reject a custom temperature
            if let Some(body) = request_body.as_object_mut() {
                body.remove("temperature");
            }
        } else {
            request_body["max_tokens"] = serde_json::json!(MAX_TOKENS);
        }

        request_body
    }
}

impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn submit(&self, prompt: &str, image_png: &[u8]) -> anyhow::Result<String> {
        let request_body = self.request_body(prompt, image_png);

        info!("Sending request to OpenAI API (model: {})", self.model);

        let response = self
            .client
            .post(OPENAI_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            warn!("OpenAI API error: {} - {}", status, error_text);
            return Err(anyhow::anyhow!("OpenAI API error: {} - {}", status, error_text));
        }

        let api_response: OpenAIResponse = response.json().await?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI API"))?;

        debug!("Received response from OpenAI: {}", content);
        Ok(content)
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages API with a base64 image block
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "claude-3-7-sonnet-latest".to_string()),
        }
    }

    /// Reads CLAUDE_API_KEY, falling back to ANTHROPIC_API_KEY
    pub fn from_env(model: Option<String>) -> anyhow::Result<Self> {
        let api_key = std::env::var("CLAUDE_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .map_err(|_| {
                anyhow::anyhow!("CLAUDE_API_KEY or ANTHROPIC_API_KEY environment variable not set")
            })?;
        Ok(Self::new(api_key, model))
    }

    fn request_body(&self, prompt: &str, image_png: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model.clone(),
            "max_tokens": MAX_TOKENS,
            "temperature": 0.0,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": prompt
                    },
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": general_purpose::STANDARD.encode(image_png)
                        }
                    }
                ]
            }]
        })
    }
}

impl VisionProvider for ClaudeProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn submit(&self, prompt: &str, image_png: &[u8]) -> anyhow::Result<String> {
        let request_body = self.request_body(prompt, image_png);

        info!("Sending request to Claude API (model: {})", self.model);

        let response = self
            .client
            .post(CLAUDE_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", CLAUDE_API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            warn!("Claude API error: {} - {}", status, error_text);
            return Err(anyhow::anyhow!("Claude API error: {} - {}", status, error_text));
        }

        let api_response: ClaudeResponse = response.json().await?;
        let content = api_response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow::anyhow!("No text content in Claude response"))?;

        debug!("Received response from Claude: {}", content);
        Ok(content)
    }
}

/// Which vision service to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Claude,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            other => Err(anyhow::anyhow!(
                "unknown provider '{}', expected 'openai' or 'claude'",
                other
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Claude => write!(f, "claude"),
        }
    }
}

/// Provider chosen at runtime
pub enum Provider {
    OpenAi(OpenAiProvider),
    Claude(ClaudeProvider),
}

impl Provider {
    /// Build the provider with credentials from the environment
    pub fn from_env(kind: ProviderKind, model: Option<String>) -> anyhow::Result<Self> {
        Ok(match kind {
            ProviderKind::OpenAi => Provider::OpenAi(OpenAiProvider::from_env(model)?),
            ProviderKind::Claude => Provider::Claude(ClaudeProvider::from_env(model)?),
        })
    }
}

impl VisionProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAi(p) => p.name(),
            Provider::Claude(p) => p.name(),
        }
    }

    async fn submit(&self, prompt: &str, image_png: &[u8]) -> anyhow::Result<String> {
        match self {
            Provider::OpenAi(p) => p.submit(prompt, image_png).await,
            Provider::Claude(p) => p.submit(prompt, image_png).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" claude ".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert!("gemini".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Claude.to_string(), "claude");
    }

    #[test]
    fn test_openai_token_parameter_by_model() {
        let legacy = OpenAiProvider::new("sk-test".to_string(), None);
        let body = legacy.request_body("measure", &[1, 2, 3]);
        assert_eq!(body["max_tokens"], MAX_TOKENS);
        assert!(body.get("max_completion_tokens").is_none());
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );

        let reasoning = OpenAiProvider::new("sk-test".to_string(), Some("gpt-5".to_string()));
        let body = reasoning.request_body("measure", &[]);
        assert_eq!(body["max_completion_tokens"], MAX_TOKENS);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_claude_request_shape() {
        let provider = ClaudeProvider::new("key".to_string(), None);
        let body = provider.request_body("measure", &[1, 2, 3]);

        assert_eq!(body["model"], "claude-3-7-sonnet-latest");
        assert_eq!(body["messages"][0]["content"][0]["text"], "measure");
        assert_eq!(body["messages"][0]["content"][1]["source"]["data"], "AQID");
        assert_eq!(body["messages"][0]["content"][1]["source"]["media_type"], "image/png");
    }
}
