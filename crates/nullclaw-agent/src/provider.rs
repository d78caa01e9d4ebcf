//! A uniform capability surface over every concrete provider kind, plus the
//! tagged-variant holder that stores them inline so their internal state
//! (HTTP client, credentials) keeps a stable address for the daemon's
//! lifetime.

use nullclaw_core::types::{ChatRequest, ChatResponse};

use crate::anthropic::AnthropicProvider;
use crate::cli::CliProvider;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

impl ProviderError {
    /// Whether a fresh attempt of the same request might succeed.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Transient(e.to_string())
        } else {
            Self::Malformed(e.to_string())
        }
    }
}

/// Common interface implemented by every provider kind.
pub trait LlmProvider: Send {
    /// Provider name for logging and error messages only.
    fn name(&self) -> &str;

    /// Single-turn convenience call returning only the text content.
    fn chat_with_system(
        &self,
        system: Option<&str>,
        user: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError>;

    /// Full chat call. `model`/`temperature` are the resolved values (the
    /// router may have rewritten `request.model` from a hint token).
    fn chat(
        &self,
        request: &ChatRequest,
        model: &str,
        temperature: f32,
    ) -> Result<ChatResponse, ProviderError>;

    /// Whether this provider understands structured tool-call requests.
    fn supports_native_tools(&self) -> bool;

    /// Optional warm-up (e.g. a cheap connectivity check). No-op by default.
    fn warmup(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Defaults to `chat` when a provider has no distinct tool-calling path.
    fn chat_with_tools(
        &self,
        request: &ChatRequest,
        model: &str,
        temperature: f32,
    ) -> Result<ChatResponse, ProviderError> {
        self.chat(request, model, temperature)
    }
}

/// A tagged sum type over every concrete provider. Stored by value so each
/// variant's state lives inline rather than behind an indirection that could
/// move.
pub enum ProviderHolder {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    OpenRouter(OpenAiProvider),
    Gemini(GeminiProvider),
    Ollama(OllamaProvider),
    OpenAiCompatible(OpenAiProvider),
    ClaudeCli(CliProvider),
    CodexCli(CliProvider),
    OpenAiCodex(CliProvider),
}

impl ProviderHolder {
    fn inner(&self) -> &dyn LlmProvider {
        match self {
            Self::OpenAi(p) => p,
            Self::Anthropic(p) => p,
            Self::OpenRouter(p) => p,
            Self::Gemini(p) => p,
            Self::Ollama(p) => p,
            Self::OpenAiCompatible(p) => p,
            Self::ClaudeCli(p) => p,
            Self::CodexCli(p) => p,
            Self::OpenAiCodex(p) => p,
        }
    }
}

impl LlmProvider for ProviderHolder {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn chat_with_system(
        &self,
        system: Option<&str>,
        user: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        self.inner().chat_with_system(system, user, model, temperature)
    }

    fn chat(
        &self,
        request: &ChatRequest,
        model: &str,
        temperature: f32,
    ) -> Result<ChatResponse, ProviderError> {
        self.inner().chat(request, model, temperature)
    }

    fn supports_native_tools(&self) -> bool {
        self.inner().supports_native_tools()
    }

    fn warmup(&self) -> Result<(), ProviderError> {
        self.inner().warmup()
    }

    fn supports_streaming(&self) -> bool {
        self.inner().supports_streaming()
    }

    fn chat_with_tools(
        &self,
        request: &ChatRequest,
        model: &str,
        temperature: f32,
    ) -> Result<ChatResponse, ProviderError> {
        self.inner().chat_with_tools(request, model, temperature)
    }
}
