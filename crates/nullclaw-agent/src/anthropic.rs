//! Anthropic Messages API provider, with API-key and OAuth auth.

use nullclaw_core::types::{ChatRequest, ChatResponse, Role, ToolCall, Usage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{LlmProvider, ProviderError};

const API_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";
const OAUTH_TOKEN_PREFIX: &str = "sk-ant-oat01-";

pub struct AnthropicProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    is_oauth: bool,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let is_oauth = api_key.starts_with(OAUTH_TOKEN_PREFIX);
        Self {
            client: reqwest::blocking::Client::new(),
            is_oauth,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }

    fn apply_auth(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        if self.is_oauth {
            builder
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("anthropic-beta", OAUTH_BETA)
        } else {
            builder.header("x-api-key", &self.api_key)
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn chat_with_system(
        &self,
        system: Option<&str>,
        user: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let mut request = ChatRequest::new(vec![nullclaw_core::types::Message::user(user)], model);
        if let Some(sys) = system {
            request.messages.insert(0, nullclaw_core::types::Message::system(sys));
        }
        let response = self.chat(&request, model, temperature)?;
        Ok(response.text.unwrap_or_default())
    }

    fn chat(
        &self,
        request: &ChatRequest,
        model: &str,
        temperature: f32,
    ) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(request, model, temperature);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(%model, "sending chat request to anthropic");

        let builder = self
            .client
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let resp = self.apply_auth(builder).send()?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }

        if !resp.status().is_success() {
            let text = resp.text().unwrap_or_default();
            warn!(status, body = %text, "anthropic API error");
            return Err(if status == 401 || status == 403 {
                ProviderError::Credentials(text)
            } else if status >= 500 {
                ProviderError::Transient(text)
            } else {
                ProviderError::Malformed(format!("status {status}: {text}"))
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(parse_response(api_resp))
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

/// Anthropic separates the system prompt from the message list; any
/// `Role::System` message in the history is extracted and concatenated.
fn build_request_body(request: &ChatRequest, model: &str, temperature: f32) -> serde_json::Value {
    let mut system_parts = Vec::new();
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => {
                system_parts.push(m.content.clone());
                None
            }
            Role::User => Some(serde_json::json!({"role": "user", "content": m.content})),
            Role::Assistant => Some(serde_json::json!({"role": "assistant", "content": m.content})),
            Role::Tool => Some(serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                }]
            })),
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "temperature": temperature,
        "messages": messages,
    });

    if !system_parts.is_empty() {
        body["system"] = serde_json::json!(system_parts.join("\n\n"));
    }

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                });
            }
            ContentBlock::Unknown => {}
        }
    }

    ChatResponse {
        text: if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        },
        tool_calls,
        usage: Usage {
            prompt: resp.usage.input_tokens,
            completion: resp.usage.output_tokens,
            total: resp.usage.input_tokens + resp.usage.output_tokens,
        },
        model: resp.model,
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_core::types::Message;

    #[test]
    fn build_request_body_extracts_system_messages() {
        let request = ChatRequest::new(
            vec![Message::system("be terse"), Message::user("hi")],
            "claude-opus",
        );
        let body = build_request_body(&request, "claude-opus", 0.7);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn oauth_token_prefix_switches_auth_mode() {
        let p = AnthropicProvider::new("sk-ant-oat01-xyz".into(), None);
        assert!(p.is_oauth);
        let p = AnthropicProvider::new("sk-ant-api03-xyz".into(), None);
        assert!(!p.is_oauth);
    }

    #[test]
    fn parse_response_joins_text_blocks() {
        let resp = ApiResponse {
            model: "claude-opus".into(),
            content: vec![
                ContentBlock::Text { text: "hello ".into() },
                ContentBlock::Text { text: "world".into() },
            ],
            usage: ApiUsage {
                input_tokens: 3,
                output_tokens: 2,
            },
        };
        let chat = parse_response(resp);
        assert_eq!(chat.text.as_deref(), Some("hello world"));
        assert_eq!(chat.usage.total, 5);
    }
}
