//! Google Gemini provider. Unlike the other HTTP providers, the model name
//! is part of the URL path rather than the request body, and credentials can
//! come from either an API key query param or a cached OAuth token file.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nullclaw_core::types::{ChatRequest, ChatResponse, Role, ToolCall, Usage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{LlmProvider, ProviderError};

const OAUTH_EXPIRY_SKEW: Duration = Duration::from_secs(300);

pub struct GeminiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    auth: GeminiAuth,
}

pub enum GeminiAuth {
    ApiKey(String),
    OAuthFile(PathBuf),
}

impl GeminiProvider {
    pub fn new(base_url: Option<String>, auth: GeminiAuth) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            auth,
        }
    }

    /// Build the `generateContent` URL for `model`, deduping a leading
    /// `models/` prefix the caller may already have supplied.
    fn endpoint_url(&self, model: &str) -> String {
        let model_path = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model_path)
    }

    fn resolve_token(&self) -> Result<String, ProviderError> {
        match &self.auth {
            GeminiAuth::ApiKey(key) => Ok(key.clone()),
            GeminiAuth::OAuthFile(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ProviderError::Credentials(format!("reading oauth file: {e}")))?;
                let creds: OAuthCreds = serde_json::from_str(&contents)
                    .map_err(|e| ProviderError::Credentials(format!("parsing oauth file: {e}")))?;

                // A credential file with no expiry is treated as non-expiring.
                if let Some(expires_at) = creds.expires_at {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    let expiry = Duration::from_secs(expires_at);
                    if expiry <= now.saturating_add(OAUTH_EXPIRY_SKEW) {
                        return Err(ProviderError::Credentials(
                            "gemini oauth token expired or expiring within 5 minutes".to_string(),
                        ));
                    }
                }
                Ok(creds.access_token)
            }
        }
    }
}

/// `~/.gemini/oauth_creds.json` as written by the Gemini CLI.
#[derive(Deserialize)]
struct OAuthCreds {
    access_token: String,
    #[serde(default)]
    #[allow(dead_code)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<u64>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System | Role::User | Role::Tool => "user",
        Role::Assistant => "model",
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
        let token = self.resolve_token()?;
        let url = self.endpoint_url(model);
        let body = build_request_body(request, temperature);

        debug!(%model, "sending chat request to gemini");

        let mut req = self.client.post(&url).header("content-type", "application/json");
        req = match &self.auth {
            GeminiAuth::ApiKey(_) => req.query(&[("key", token.as_str())]),
            GeminiAuth::OAuthFile(_) => req.bearer_auth(&token),
        };

        let resp = req.json(&body).send()?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            warn!(status, body = %text, "gemini API error");
            return Err(if status == 401 || status == 403 {
                ProviderError::Credentials(text)
            } else if status == 429 {
                ProviderError::RateLimited { retry_after_ms: 5000 }
            } else if status >= 500 {
                ProviderError::Transient(text)
            } else {
                ProviderError::Malformed(format!("status {status}: {text}"))
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(parse_response(api_resp, model))
    }

    fn supports_native_tools(&self) -> bool {
        false
    }
}

fn build_request_body(request: &ChatRequest, temperature: f32) -> serde_json::Value {
    let mut system_parts = Vec::new();
    let contents: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter_map(|m| {
            if m.role == Role::System {
                system_parts.push(m.content.clone());
                None
            } else {
                Some(serde_json::json!({
                    "role": role_str(m.role),
                    "parts": [{"text": m.content}],
                }))
            }
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": request.max_tokens,
        },
    });

    if !system_parts.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{"text": system_parts.join("\n\n")}],
        });
    }

    body
}

fn parse_response(resp: ApiResponse, model: &str) -> ChatResponse {
    let text = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        });

    let usage = resp
        .usage_metadata
        .map(|u| Usage {
            prompt: u.prompt_token_count,
            completion: u.candidates_token_count,
            total: u.total_token_count,
        })
        .unwrap_or_default();

    ChatResponse {
        text,
        tool_calls: Vec::<ToolCall>::new(),
        usage,
        model: model.to_string(),
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_dedups_models_prefix() {
        let provider = GeminiProvider::new(None, GeminiAuth::ApiKey("k".into()));
        assert_eq!(
            provider.endpoint_url("models/gemini-1.5-pro"),
            provider.endpoint_url("gemini-1.5-pro")
        );
    }

    #[test]
    fn oauth_file_rejects_token_expiring_within_five_minutes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        let now_secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        std::fs::write(
            &path,
            serde_json::json!({"access_token": "tok", "expires_at": now_secs + 60}).to_string(),
        )
        .unwrap();

        let provider = GeminiProvider::new(None, GeminiAuth::OAuthFile(path));
        let err = provider.resolve_token().unwrap_err();
        assert!(matches!(err, ProviderError::Credentials(_)));
    }

    #[test]
    fn oauth_file_accepts_token_with_ample_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        let now_secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        std::fs::write(
            &path,
            serde_json::json!({
                "access_token": "tok",
                "refresh_token": "refresh-tok",
                "expires_at": now_secs + 3_600,
            })
            .to_string(),
        )
        .unwrap();

        let provider = GeminiProvider::new(None, GeminiAuth::OAuthFile(path));
        assert_eq!(provider.resolve_token().unwrap(), "tok");
    }

    #[test]
    fn oauth_file_without_expiry_is_treated_as_non_expiring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        std::fs::write(&path, serde_json::json!({"access_token": "tok"}).to_string()).unwrap();

        let provider = GeminiProvider::new(None, GeminiAuth::OAuthFile(path));
        assert_eq!(provider.resolve_token().unwrap(), "tok");
    }

    #[test]
    fn role_str_maps_assistant_to_model() {
        assert_eq!(role_str(Role::Assistant), "model");
        assert_eq!(role_str(Role::User), "user");
    }
}
