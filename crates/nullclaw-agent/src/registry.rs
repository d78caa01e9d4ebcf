//! Built-in provider registry: maps well-known provider IDs to their base
//! URLs and default models, and implements the credential fan-in precedence
//! used by the provider factory.

use crate::anthropic::AnthropicProvider;
use crate::gemini::{GeminiAuth, GeminiProvider};
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{ProviderError, ProviderHolder};

/// A well-known OpenAI-compatible provider endpoint.
pub struct KnownProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub chat_path: &'static str,
    pub default_model: &'static str,
}

impl KnownProvider {
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }
}

pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownProvider {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        chat_path: "/chat/completions",
        default_model: "openai/gpt-4o-mini",
    },
    KnownProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai",
        chat_path: "/v1/chat/completions",
        default_model: "llama-3.3-70b-versatile",
    },
    KnownProvider {
        id: "mistral",
        name: "Mistral AI",
        base_url: "https://api.mistral.ai",
        chat_path: "/v1/chat/completions",
        default_model: "mistral-large-latest",
    },
    KnownProvider {
        id: "xai",
        name: "xAI (Grok)",
        base_url: "https://api.x.ai",
        chat_path: "/v1/chat/completions",
        default_model: "grok-2-latest",
    },
    KnownProvider {
        id: "grok",
        name: "xAI (Grok)",
        base_url: "https://api.x.ai",
        chat_path: "/v1/chat/completions",
        default_model: "grok-2-latest",
    },
    KnownProvider {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-chat",
    },
    KnownProvider {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz",
        chat_path: "/v1/chat/completions",
        default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
    },
    KnownProvider {
        id: "fireworks",
        name: "Fireworks AI",
        base_url: "https://api.fireworks.ai/inference/v1",
        chat_path: "/chat/completions",
        default_model: "accounts/fireworks/models/llama-v3p3-70b-instruct",
    },
    KnownProvider {
        id: "perplexity",
        name: "Perplexity",
        base_url: "https://api.perplexity.ai",
        chat_path: "/chat/completions",
        default_model: "sonar-pro",
    },
    KnownProvider {
        id: "cohere",
        name: "Cohere",
        base_url: "https://api.cohere.com/compatibility",
        chat_path: "/v1/chat/completions",
        default_model: "command-r-plus-08-2024",
    },
    KnownProvider {
        id: "venice",
        name: "Venice AI",
        base_url: "https://api.venice.ai",
        chat_path: "/v1/chat/completions",
        default_model: "llama-3.3-70b",
    },
    KnownProvider {
        id: "moonshot",
        name: "Moonshot AI (Kimi)",
        base_url: "https://api.moonshot.cn",
        chat_path: "/v1/chat/completions",
        default_model: "moonshot-v1-8k",
    },
    KnownProvider {
        id: "kimi",
        name: "Moonshot AI (Kimi)",
        base_url: "https://api.moonshot.cn",
        chat_path: "/v1/chat/completions",
        default_model: "moonshot-v1-8k",
    },
    KnownProvider {
        id: "cloudflare",
        name: "Cloudflare AI Gateway",
        base_url: "https://gateway.ai.cloudflare.com/v1",
        chat_path: "/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownProvider {
        id: "vercel",
        name: "Vercel AI Gateway",
        base_url: "https://api.vercel.ai",
        chat_path: "/v1/chat/completions",
        default_model: "openai/gpt-4o-mini",
    },
    KnownProvider {
        id: "zai-coding",
        name: "Z.AI (Coding)",
        base_url: "https://api.z.ai/api/coding/paas/v4",
        chat_path: "/chat/completions",
        default_model: "glm-4.5",
    },
    KnownProvider {
        id: "zai-glm",
        name: "Z.AI (GLM)",
        base_url: "https://api.z.ai/api/paas/v4",
        chat_path: "/chat/completions",
        default_model: "glm-4.5",
    },
    KnownProvider {
        id: "glm",
        name: "Z.AI (GLM)",
        base_url: "https://api.z.ai/api/paas/v4",
        chat_path: "/chat/completions",
        default_model: "glm-4.5",
    },
    KnownProvider {
        id: "minimax",
        name: "MiniMax",
        base_url: "https://api.minimaxi.com/v1",
        chat_path: "/chat/completions",
        default_model: "MiniMax-Text-01",
    },
    KnownProvider {
        id: "bedrock",
        name: "AWS Bedrock",
        base_url: "https://bedrock-runtime.us-east-1.amazonaws.com",
        chat_path: "/chat/completions",
        default_model: "anthropic.claude-3-5-sonnet-20241022-v2:0",
    },
    KnownProvider {
        id: "qianfan",
        name: "Baidu Qianfan",
        base_url: "https://aip.baidubce.com",
        chat_path: "/v1/chat/completions",
        default_model: "ernie-4.0-8k",
    },
    KnownProvider {
        id: "qwen",
        name: "Qwen (Alibaba)",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        chat_path: "/chat/completions",
        default_model: "qwen-turbo",
    },
    KnownProvider {
        id: "qwen-intl",
        name: "Qwen (International)",
        base_url: "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        chat_path: "/chat/completions",
        default_model: "qwen-turbo",
    },
    KnownProvider {
        id: "qwen-us",
        name: "Qwen (US)",
        base_url: "https://dashscope-us.aliyuncs.com/compatible-mode/v1",
        chat_path: "/chat/completions",
        default_model: "qwen-turbo",
    },
    KnownProvider {
        id: "copilot",
        name: "GitHub Copilot",
        base_url: "https://api.githubcopilot.com",
        chat_path: "/chat/completions",
        default_model: "gpt-4o",
    },
    KnownProvider {
        id: "lmstudio",
        name: "LM Studio (local)",
        base_url: "http://localhost:1234/v1",
        chat_path: "/chat/completions",
        default_model: "local-model",
    },
    KnownProvider {
        id: "nvidia",
        name: "NVIDIA NIM",
        base_url: "https://integrate.api.nvidia.com/v1",
        chat_path: "/chat/completions",
        default_model: "meta/llama-3.1-70b-instruct",
    },
    KnownProvider {
        id: "astrai",
        name: "AstrAI",
        base_url: "https://as-trai.com/v1",
        chat_path: "/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownProvider {
        id: "poe",
        name: "Poe",
        base_url: "https://api.poe.com/v1",
        chat_path: "/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownProvider {
        id: "opencode",
        name: "OpenCode",
        base_url: "https://api.opencode.ai",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
    },
];

pub fn lookup(id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id)
}

/// A fully resolved (base_url, chat_path) pair, independent of whether the
/// provider name was well-known, a `custom:`/`anthropic-custom:` override,
/// or an unrecognized name (which routes via OpenRouter).
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub chat_path: String,
    pub is_anthropic_wire: bool,
}

/// Resolve a provider name into a base URL, honoring `custom:<url>` and
/// `anthropic-custom:<url>` overrides. Unknown plain names fall back to
/// OpenRouter.
pub fn resolve_endpoint(name: &str) -> ResolvedEndpoint {
    if let Some(url) = name.strip_prefix("anthropic-custom:") {
        return ResolvedEndpoint {
            base_url: url.to_string(),
            chat_path: String::new(),
            is_anthropic_wire: true,
        };
    }
    if let Some(url) = name.strip_prefix("custom:") {
        return ResolvedEndpoint {
            base_url: url.to_string(),
            chat_path: "/chat/completions".to_string(),
            is_anthropic_wire: false,
        };
    }
    if let Some(p) = lookup(name) {
        return ResolvedEndpoint {
            base_url: p.base_url.to_string(),
            chat_path: p.chat_path.to_string(),
            is_anthropic_wire: false,
        };
    }
    let openrouter = lookup("openrouter").expect("openrouter is always registered");
    ResolvedEndpoint {
        base_url: openrouter.base_url.to_string(),
        chat_path: openrouter.chat_path.to_string(),
        is_anthropic_wire: false,
    }
}

/// Provider-specific environment variables consulted before the generic
/// `NULLCLAW_API_KEY`/`API_KEY` fallbacks. Order matters within a list.
fn provider_env_vars(name: &str) -> &'static [&'static str] {
    match name {
        "anthropic" => &["ANTHROPIC_OAUTH_TOKEN", "ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "groq" => &["GROQ_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "deepseek" => &["DEEPSEEK_API_KEY"],
        "xai" | "grok" => &["XAI_API_KEY"],
        "together" => &["TOGETHER_API_KEY"],
        "fireworks" => &["FIREWORKS_API_KEY"],
        "perplexity" => &["PERPLEXITY_API_KEY"],
        "cohere" => &["COHERE_API_KEY"],
        "venice" => &["VENICE_API_KEY"],
        "moonshot" | "kimi" => &["MOONSHOT_API_KEY"],
        "nvidia" => &["NVIDIA_API_KEY"],
        "astrai" => &["ASTRAI_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        _ => &[],
    }
}

/// Resolve a provider's API key following the documented precedence:
/// (1) explicit key from config (trimmed, empty rejected),
/// (2) provider-specific environment variable(s),
/// (3) generic fallbacks `NULLCLAW_API_KEY`, `API_KEY`.
pub fn resolve_api_key(provider_name: &str, explicit: Option<&str>) -> Option<String> {
    if let Some(key) = explicit {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    for var in provider_env_vars(provider_name) {
        if let Ok(value) = std::env::var(var) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    for var in ["NULLCLAW_API_KEY", "API_KEY"] {
        if let Ok(value) = std::env::var(var) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Construct an HTTP-backed [`ProviderHolder`] for a provider name, resolving
/// credentials and endpoint through the same precedence every other caller
/// uses. CLI-subprocess providers (`claude-cli`, `codex-cli`, `openai-codex`)
/// need a command path that has no home in this config surface, so they are
/// built directly by whatever owns that configuration, not through here.
pub fn build_provider_holder(
    name: &str,
    explicit_api_key: Option<&str>,
    base_url_override: Option<&str>,
) -> Result<ProviderHolder, ProviderError> {
    match name {
        "anthropic" => {
            let key = resolve_api_key("anthropic", explicit_api_key)
                .ok_or_else(|| ProviderError::Credentials("no anthropic API key configured".to_string()))?;
            Ok(ProviderHolder::Anthropic(AnthropicProvider::new(
                key,
                base_url_override.map(str::to_string),
            )))
        }
        "gemini" => {
            let key = resolve_api_key("gemini", explicit_api_key)
                .ok_or_else(|| ProviderError::Credentials("no gemini API key configured".to_string()))?;
            Ok(ProviderHolder::Gemini(GeminiProvider::new(
                base_url_override.map(str::to_string),
                GeminiAuth::ApiKey(key),
            )))
        }
        "ollama" => Ok(ProviderHolder::Ollama(OllamaProvider::new(
            base_url_override.map(str::to_string),
        ))),
        _ => {
            let endpoint = resolve_endpoint(name);
            let base_url = base_url_override.unwrap_or(&endpoint.base_url).to_string();
            let key = resolve_api_key(name, explicit_api_key)
                .ok_or_else(|| ProviderError::Credentials(format!("no API key configured for provider '{name}'")))?;

            if endpoint.is_anthropic_wire {
                return Ok(ProviderHolder::Anthropic(AnthropicProvider::new(key, Some(base_url))));
            }
            if name == "openrouter" {
                return Ok(ProviderHolder::OpenRouter(OpenAiProvider::new(
                    name,
                    key,
                    base_url,
                    endpoint.chat_path,
                )));
            }
            Ok(ProviderHolder::OpenAiCompatible(OpenAiProvider::new(
                name,
                key,
                base_url,
                endpoint.chat_path,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_routes_via_openrouter() {
        let resolved = resolve_endpoint("totally-unknown-provider");
        assert_eq!(resolved.base_url, lookup("openrouter").unwrap().base_url);
    }

    #[test]
    fn custom_prefix_supplies_url_inline() {
        let resolved = resolve_endpoint("custom:https://my-llm.example.com");
        assert_eq!(resolved.base_url, "https://my-llm.example.com");
        assert!(!resolved.is_anthropic_wire);
    }

    #[test]
    fn anthropic_custom_prefix_marks_anthropic_wire() {
        let resolved = resolve_endpoint("anthropic-custom:https://my-claude.example.com");
        assert_eq!(resolved.base_url, "https://my-claude.example.com");
        assert!(resolved.is_anthropic_wire);
    }

    #[test]
    fn known_provider_resolves_exact_endpoint() {
        let p = lookup("groq").unwrap();
        assert_eq!(p.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn explicit_key_wins_over_env() {
        assert_eq!(
            resolve_api_key("openai", Some("explicit-key")),
            Some("explicit-key".to_string())
        );
    }

    #[test]
    fn empty_explicit_key_is_rejected() {
        // Falls through to env/generic lookup, which here resolves to None
        // since the test environment carries no matching vars.
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("NULLCLAW_API_KEY");
        std::env::remove_var("API_KEY");
        assert_eq!(resolve_api_key("openai", Some("   ")), None);
    }

    #[test]
    fn ollama_holder_builds_without_a_key() {
        use crate::provider::LlmProvider;
        let holder = build_provider_holder("ollama", None, None).unwrap();
        assert_eq!(holder.name(), "ollama");
    }

    #[test]
    fn unknown_provider_without_key_fails_with_credentials_error() {
        std::env::remove_var("NULLCLAW_API_KEY");
        std::env::remove_var("API_KEY");
        let err = build_provider_holder("totally-unknown-provider", None, None).unwrap_err();
        assert!(matches!(err, ProviderError::Credentials(_)));
    }
}
