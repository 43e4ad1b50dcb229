//! Async LLM reasoner
//!
//! Model-agnostic HTTP client that turns a vehicle's context into a short
//! explanation. Supports both Anthropic and OpenAI-compatible APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::error::{FleetError, Result};
use crate::fleet::memory::MemoryEvent;
use crate::fleet::vehicle::VehicleSnapshot;
use crate::llm::context::VehicleContext;
use crate::llm::reasoning::ReasoningProvider;

const SYSTEM_PROMPT: &str = "You are the dispatcher's assistant for a delivery fleet. \
Given one vehicle's state and recent events, explain in one or two sentences what the \
vehicle is doing and why. Mention traffic only if it affected the route.";

const MAX_TOKENS: u32 = 256;

/// API format type
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

/// Reasoning provider backed by a hosted model
pub struct LlmReasoner {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
}

impl LlmReasoner {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            api_format,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    pub fn api_format(&self) -> &ApiFormat {
        &self.api_format
    }

    /// Create a reasoner from environment variables
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to Anthropic API)
    /// Optional: LLM_MODEL (defaults to claude-3-haiku-20240307)
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("LLM_API_KEY").map_err(|_| FleetError::Llm("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".into());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-3-haiku-20240307".into());

        Ok(Self::new(api_key, api_url, model))
    }

    /// Send a completion request and return the text reply
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let response = self
            .request(system, user)
            .send()
            .await
            .map_err(|e| FleetError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FleetError::Llm(format!("API error {}: {}", status, body)));
        }

        let reply: Reply = response
            .json()
            .await
            .map_err(|e| FleetError::Llm(e.to_string()))?;
        reply
            .text()
            .ok_or_else(|| FleetError::Llm("Empty response".into()))
    }

    /// Headers and body for the configured API format
    fn request(&self, system: &str, user: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(&self.api_url)
            .header("content-type", "application/json");
        match self.api_format {
            ApiFormat::Anthropic => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&self.body(Some(system), vec![Message::user(user)])),
            ApiFormat::OpenAI => builder
                .bearer_auth(&self.api_key)
                .json(&self.body(None, vec![Message::system(system), Message::user(user)])),
        }
    }

    fn body<'a>(&'a self, system: Option<&'a str>, messages: Vec<Message<'a>>) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages,
        }
    }
}

#[async_trait]
impl ReasoningProvider for LlmReasoner {
    async fn produce_reasoning(&self, vehicle: &VehicleSnapshot, memory: &[MemoryEvent]) -> Result<String> {
        let context = VehicleContext::from_vehicle(vehicle, memory);
        tracing::debug!("Requesting reasoning for {} from {}", vehicle.id, self.model);
        self.complete(SYSTEM_PROMPT, &context.summary()).await
    }
}

/// Request body; Anthropic takes the system prompt as a field, OpenAI as a message
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> Message<'a> {
    fn system(content: &'a str) -> Self {
        Self { role: "system", content }
    }

    fn user(content: &'a str) -> Self {
        Self { role: "user", content }
    }
}

/// Either API's reply shape
#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Anthropic { content: Vec<TextBlock> },
    OpenAI { choices: Vec<Choice> },
}

#[derive(Deserialize)]
struct TextBlock {
    text: String,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl Reply {
    fn text(self) -> Option<String> {
        let raw = match self {
            Reply::Anthropic { content } => content.into_iter().next().map(|b| b.text),
            Reply::OpenAI { choices } => choices.into_iter().next().map(|c| c.message.content),
        }?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_format_detection() {
        let anthropic = LlmReasoner::new(
            "key".into(),
            "https://api.anthropic.com/v1/messages".into(),
            "model".into(),
        );
        assert_eq!(anthropic.api_format(), &ApiFormat::Anthropic);

        let compatible = LlmReasoner::new(
            "key".into(),
            "https://api.example.com/v1/chat/completions".into(),
            "model".into(),
        );
        assert_eq!(compatible.api_format(), &ApiFormat::OpenAI);
    }

    #[test]
    fn test_reply_parsing_for_both_formats() {
        let openai = r#"{"choices":[{"message":{"role":"assistant","content":" On route. "}}]}"#;
        let reply: Reply = serde_json::from_str(openai).unwrap();
        assert_eq!(reply.text().as_deref(), Some("On route."));

        let anthropic = r#"{"id":"msg_1","content":[{"type":"text","text":"Detoured around traffic."}]}"#;
        let reply: Reply = serde_json::from_str(anthropic).unwrap();
        assert_eq!(reply.text().as_deref(), Some("Detoured around traffic."));

        let empty: Reply = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_system_prompt_placement() {
        let reasoner = LlmReasoner::new("key".into(), "https://api.anthropic.com/v1/messages".into(), "m".into());

        let anthropic = serde_json::to_value(reasoner.body(Some("sys"), vec![Message::user("hi")])).unwrap();
        assert_eq!(anthropic["system"], "sys");
        assert_eq!(anthropic["messages"].as_array().map(Vec::len), Some(1));

        let openai =
            serde_json::to_value(reasoner.body(None, vec![Message::system("sys"), Message::user("hi")])).unwrap();
        assert!(openai.get("system").is_none());
        assert_eq!(openai["messages"][0]["role"], "system");
        assert_eq!(openai["max_tokens"], MAX_TOKENS);
    }
}
