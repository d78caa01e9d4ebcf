//! Layered configuration: defaults, then `config.toml`, then `NULLCLAW_*`
//! environment overrides. Never fails startup — a missing or malformed
//! source is logged (scrubbed) and the loader falls back to the prior layer.

use std::borrow::Cow;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scrubber::sanitize_api_error;

/// Maps a `NULLCLAW_`-stripped env var suffix onto the config field it
/// overrides. The three short public names (`PROVIDER`, `MODEL`,
/// `TEMPERATURE`) don't match their `default_`-prefixed field names, so they
/// need an explicit remap; everything else is a flat field name once
/// lowercased (`GATEWAY_HOST` -> `gateway_host`, `API_KEY` -> `api_key`, ...).
/// Supplying this closure to `Env::map` replaces figment's default
/// lowercasing entirely, so the fallback arm has to redo it.
fn map_env_key(key: &str) -> Cow<'static, str> {
    match key {
        "PROVIDER" => Cow::Borrowed("default_provider"),
        "MODEL" => Cow::Borrowed("default_model"),
        "TEMPERATURE" => Cow::Borrowed("default_temperature"),
        other => Cow::Owned(other.to_lowercase()),
    }
}

pub const DEFAULT_GATEWAY_PORT: u16 = 18789;
pub const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFallback {
    pub model: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: None,
            endpoint: None,
            model: default_transcription_model(),
            language: None,
        }
    }
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

/// Top-level config (`config.toml` + `NULLCLAW_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullclawConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_gateway_host")]
    pub gateway_host: String,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    #[serde(default)]
    pub allow_public_bind: bool,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default)]
    pub routes: Vec<crate::types::Route>,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,
    #[serde(default)]
    pub model_fallbacks: Vec<ModelFallback>,
    #[serde(default = "default_scheduler_poll_secs")]
    pub scheduler_poll_secs: u64,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

impl Default for NullclawConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            api_key: None,
            base_url: None,
            gateway_host: default_gateway_host(),
            gateway_port: default_gateway_port(),
            allow_public_bind: false,
            workspace_dir: default_workspace_dir(),
            routes: Vec::new(),
            fallback_providers: Vec::new(),
            provider_retries: default_provider_retries(),
            provider_backoff_ms: default_provider_backoff_ms(),
            model_fallbacks: Vec::new(),
            scheduler_poll_secs: default_scheduler_poll_secs(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_gateway_host() -> String {
    DEFAULT_GATEWAY_HOST.to_string()
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_provider_retries() -> u32 {
    2
}
fn default_provider_backoff_ms() -> u64 {
    500
}
fn default_scheduler_poll_secs() -> u64 {
    5
}

fn default_workspace_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.nullclaw")
}

impl NullclawConfig {
    /// Load config from `<workspace>/config.toml` with `NULLCLAW_*` env
    /// overrides. Always returns a usable config — never a startup failure.
    pub fn load() -> Self {
        let workspace = std::env::var("NULLCLAW_WORKSPACE").unwrap_or_else(|_| default_workspace_dir());
        let config_path = format!("{workspace}/config.toml");

        let figment = Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("NULLCLAW_").map(map_env_key));

        let mut config: Self = match figment.extract() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %sanitize_api_error(&e.to_string()), "config extraction failed, using defaults");
                Self::default()
            }
        };

        if !(0.0..=2.0).contains(&config.default_temperature) {
            warn!(
                value = config.default_temperature,
                "NULLCLAW_TEMPERATURE out of range [0,2], reverting to default"
            );
            config.default_temperature = default_temperature();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_override_names_map_to_default_fields() {
        assert_eq!(map_env_key("PROVIDER"), "default_provider");
        assert_eq!(map_env_key("MODEL"), "default_model");
        assert_eq!(map_env_key("TEMPERATURE"), "default_temperature");
    }

    #[test]
    fn multi_word_keys_stay_flat_rather_than_nesting() {
        assert_eq!(map_env_key("GATEWAY_HOST"), "gateway_host");
        assert_eq!(map_env_key("GATEWAY_PORT"), "gateway_port");
        assert_eq!(map_env_key("API_KEY"), "api_key");
        assert_eq!(map_env_key("ALLOW_PUBLIC_BIND"), "allow_public_bind");
        assert_eq!(map_env_key("BASE_URL"), "base_url");
    }

    #[test]
    fn load_applies_short_and_flat_env_overrides() {
        std::env::set_var("NULLCLAW_PROVIDER", "anthropic");
        std::env::set_var("NULLCLAW_MODEL", "claude-opus");
        std::env::set_var("NULLCLAW_TEMPERATURE", "0.4");
        std::env::set_var("NULLCLAW_GATEWAY_HOST", "0.0.0.0");

        let config = NullclawConfig::load();

        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.default_model, "claude-opus");
        assert_eq!(config.default_temperature, 0.4);
        assert_eq!(config.gateway_host, "0.0.0.0");

        std::env::remove_var("NULLCLAW_PROVIDER");
        std::env::remove_var("NULLCLAW_MODEL");
        std::env::remove_var("NULLCLAW_TEMPERATURE");
        std::env::remove_var("NULLCLAW_GATEWAY_HOST");
    }
}
