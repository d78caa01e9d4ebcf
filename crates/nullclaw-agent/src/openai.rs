//! OpenAI-compatible chat completions provider. Reused for OpenAI itself,
//! OpenRouter, and any `custom:<url>` endpoint that speaks the same wire
//! format.

use nullclaw_core::types::{ChatRequest, ChatResponse, Role, ToolCall, Usage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{LlmProvider, ProviderError};

pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    chat_path: String,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        chat_path: String,
    ) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path,
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn chat_with_system(
        &self,
        system: Option<&str>,
        user: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(nullclaw_core::types::Message::system(sys));
        }
        messages.push(nullclaw_core::types::Message::user(user));
        let request = ChatRequest::new(messages, model);
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
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(provider = %self.provider_name, %model, "sending chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()?;

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
            warn!(provider = %self.provider_name, status, body = %text, "API error");
            return Err(classify_error_status(status, text));
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

fn classify_error_status(status: u16, message: String) -> ProviderError {
    if status == 401 || status == 403 {
        ProviderError::Credentials(message)
    } else if status >= 500 {
        ProviderError::Transient(message)
    } else {
        ProviderError::Malformed(format!("status {status}: {message}"))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn build_request_body(request: &ChatRequest, model: &str, temperature: f32) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| {
            let mut v = serde_json::json!({
                "role": role_str(m.role),
                "content": m.content,
            });
            if let Some(id) = &m.tool_call_id {
                v["tool_call_id"] = serde_json::json!(id);
            }
            v
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": temperature,
        "stream": false,
    });

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let text = choice.as_ref().and_then(|c| c.message.content.clone());

    let tool_calls: Vec<ToolCall> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let usage = resp
        .usage
        .map(|u| Usage {
            prompt: u.prompt_tokens,
            completion: u.completion_tokens,
            total: u.prompt_tokens + u.completion_tokens,
        })
        .unwrap_or_default();

    ChatResponse {
        text,
        tool_calls,
        usage,
        model: resp.model,
    }
}

#[derive(Deserialize)]
pub(crate) struct ApiResponse {
    pub(crate) model: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: ChatMessage,
}

#[derive(Deserialize, Clone)]
pub(crate) struct ChatMessage {
    pub(crate) content: Option<String>,
    pub(crate) tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize, Clone)]
pub(crate) struct ApiToolCall {
    pub(crate) id: String,
    pub(crate) function: ApiFunction,
}

#[derive(Deserialize, Clone)]
pub(crate) struct ApiFunction {
    pub(crate) name: String,
    pub(crate) arguments: String,
}

#[derive(Deserialize)]
pub(crate) struct ApiUsage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_core::types::Message;

    #[test]
    fn build_request_body_includes_tools_when_present() {
        let mut request = ChatRequest::new(vec![Message::user("hi")], "gpt-4o-mini");
        request.tools.push(nullclaw_core::types::ToolSpec {
            name: "lookup".into(),
            description: "look something up".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let body = build_request_body(&request, "gpt-4o-mini", 0.5);
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn parse_response_extracts_tool_calls() {
        let resp = ApiResponse {
            model: "gpt-4o-mini".into(),
            choices: vec![Choice {
                message: ChatMessage {
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: "call_1".into(),
                        function: ApiFunction {
                            name: "lookup".into(),
                            arguments: "{}".into(),
                        },
                    }]),
                },
            }],
            usage: Some(ApiUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        };
        let chat = parse_response(resp);
        assert_eq!(chat.tool_calls.len(), 1);
        assert_eq!(chat.usage.total, 15);
    }

    #[test]
    fn classify_error_status_maps_401_to_credentials() {
        assert!(matches!(
            classify_error_status(401, "bad key".into()),
            ProviderError::Credentials(_)
        ));
    }

    #[test]
    fn classify_error_status_maps_500_to_transient() {
        assert!(matches!(
            classify_error_status(503, "down".into()),
            ProviderError::Transient(_)
        ));
    }
}
