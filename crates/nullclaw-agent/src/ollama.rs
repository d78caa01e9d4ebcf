//! Local Ollama provider. Speaks `/api/chat`, which differs enough from the
//! OpenAI wire format (message envelope, usage field names) to need its own
//! request/response types.

use nullclaw_core::types::{ChatRequest, ChatResponse, Role, ToolCall, Usage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{LlmProvider, ProviderError};

pub struct OllamaProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
        }
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

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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
        _temperature: f32,
    ) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(request, model);
        let url = format!("{}/api/chat", self.base_url);

        debug!(%model, "sending chat request to ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Transient(e.to_string())
                } else {
                    ProviderError::from(e)
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            warn!(status, body = %text, "ollama API error");
            return Err(if status >= 500 {
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
        false
    }
}

fn build_request_body(request: &ChatRequest, model: &str) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": role_str(m.role),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": false,
        "options": {
            "num_predict": request.max_tokens,
        },
    })
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    ChatResponse {
        text: Some(resp.message.content),
        tool_calls: Vec::<ToolCall>::new(),
        usage: Usage {
            prompt: resp.prompt_eval_count.unwrap_or(0),
            completion: resp.eval_count.unwrap_or(0),
            total: resp.prompt_eval_count.unwrap_or(0) + resp.eval_count.unwrap_or(0),
        },
        model: resp.model,
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    message: OllamaMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_core::types::Message;

    #[test]
    fn build_request_body_maps_roles() {
        let request = ChatRequest::new(
            vec![Message::system("be terse"), Message::user("hi")],
            "llama3",
        );
        let body = build_request_body(&request, "llama3");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn parse_response_sums_usage() {
        let resp = ApiResponse {
            model: "llama3".into(),
            message: OllamaMessage {
                content: "hi there".into(),
            },
            prompt_eval_count: Some(4),
            eval_count: Some(6),
        };
        let chat = parse_response(resp);
        assert_eq!(chat.text.as_deref(), Some("hi there"));
        assert_eq!(chat.usage.total, 10);
    }
}
