//! Resolves hint-prefixed model tokens to `(provider, model)` pairs and
//! sequences retries over an ordered fallback list.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use nullclaw_core::config::{ModelFallback, NullclawConfig};
use nullclaw_core::types::{ChatRequest, ChatResponse, ResolvedRoute, Route};
use tracing::warn;

use crate::provider::{LlmProvider, ProviderError};
use crate::registry::build_provider_holder;

pub struct ProviderSlot {
    pub name: String,
    pub provider: Box<dyn LlmProvider>,
}

/// Routes a [`ChatRequest`] to the resolved provider, retrying and falling
/// back according to the configured chain.
pub struct Router {
    slots: Vec<ProviderSlot>,
    hints: HashMap<String, (usize, String)>,
    fallback_provider_indices: Vec<usize>,
    model_fallbacks: HashMap<String, Vec<String>>,
    provider_retries: u32,
    provider_backoff_ms: u64,
}

impl Router {
    pub fn new(
        slots: Vec<ProviderSlot>,
        routes: &[Route],
        fallback_providers: &[String],
        model_fallbacks: &[ModelFallback],
        provider_retries: u32,
        provider_backoff_ms: u64,
    ) -> Self {
        let mut hints = HashMap::new();
        for route in routes {
            match slots.iter().position(|s| s.name == route.provider_name) {
                Some(idx) => {
                    hints.insert(route.hint.clone(), (idx, route.model.clone()));
                }
                None => {
                    warn!(
                        hint = %route.hint,
                        provider = %route.provider_name,
                        "route references unknown provider, discarding"
                    );
                }
            }
        }

        let fallback_provider_indices = fallback_providers
            .iter()
            .filter_map(|name| slots.iter().position(|s| &s.name == name))
            .collect();

        let model_fallbacks = model_fallbacks
            .iter()
            .map(|mf| (mf.model.clone(), mf.fallbacks.clone()))
            .collect();

        Self {
            slots,
            hints,
            fallback_provider_indices,
            model_fallbacks,
            provider_retries,
            provider_backoff_ms,
        }
    }

    /// Build a router from a loaded config: one provider slot per distinct
    /// name referenced by `default_provider`, `fallback_providers`, or any
    /// route. A name that fails to resolve (no API key reachable through its
    /// precedence chain) is dropped with a warning instead of aborting
    /// startup; the remaining slots still route everything that doesn't need
    /// the missing provider.
    pub fn from_config(config: &NullclawConfig) -> Self {
        let mut names = vec![config.default_provider.clone()];
        names.extend(config.fallback_providers.iter().cloned());
        names.extend(config.routes.iter().map(|r| r.provider_name.clone()));

        let mut seen = HashSet::new();
        let mut slots = Vec::new();
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            let explicit_key = if name == config.default_provider {
                config.api_key.as_deref()
            } else {
                config
                    .routes
                    .iter()
                    .find(|r| r.provider_name == name)
                    .and_then(|r| r.api_key.as_deref())
            };
            let base_url = (name == config.default_provider)
                .then(|| config.base_url.as_deref())
                .flatten();

            match build_provider_holder(&name, explicit_key, base_url) {
                Ok(holder) => slots.push(ProviderSlot {
                    name,
                    provider: Box::new(holder),
                }),
                Err(e) => warn!(provider = %name, error = %e, "dropping provider slot, construction failed"),
            }
        }

        Self::new(
            slots,
            &config.routes,
            &config.fallback_providers,
            &config.model_fallbacks,
            config.provider_retries,
            config.provider_backoff_ms,
        )
    }

    /// Resolve a model token. `hint:<name>` tokens are looked up in the hint
    /// map; a miss silently degrades to the default provider with the token
    /// unchanged. Any other token routes to the default provider as-is.
    pub fn resolve(&self, model_token: &str) -> ResolvedRoute {
        if let Some(hint) = model_token.strip_prefix("hint:") {
            if let Some((idx, model)) = self.hints.get(hint) {
                return ResolvedRoute {
                    provider_index: *idx,
                    model: model.clone(),
                };
            }
        }
        ResolvedRoute {
            provider_index: 0,
            model: model_token.to_string(),
        }
    }

    pub fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let resolved = self.resolve(&request.model);
        self.chat_with_fallback(request, resolved.provider_index, &resolved.model)
    }

    fn chat_with_fallback(
        &self,
        request: &ChatRequest,
        provider_index: usize,
        model: &str,
    ) -> Result<ChatResponse, ProviderError> {
        match self.try_provider(request, provider_index, model) {
            Ok(resp) => Ok(resp),
            Err(e) if !e.retriable() => Err(e),
            Err(e) => {
                if let Some(resp) = self.try_model_fallbacks(request, provider_index, model)? {
                    return Ok(resp);
                }
                self.try_fallback_providers(request, model, e)
            }
        }
    }

    fn try_model_fallbacks(
        &self,
        request: &ChatRequest,
        provider_index: usize,
        model: &str,
    ) -> Result<Option<ChatResponse>, ProviderError> {
        let Some(fallback_models) = self.model_fallbacks.get(model) else {
            return Ok(None);
        };
        for fb_model in fallback_models {
            match self.try_provider(request, provider_index, fb_model) {
                Ok(resp) => return Ok(Some(resp)),
                Err(e) if !e.retriable() => return Err(e),
                Err(_) => continue,
            }
        }
        Ok(None)
    }

    fn try_fallback_providers(
        &self,
        request: &ChatRequest,
        model: &str,
        mut last_err: ProviderError,
    ) -> Result<ChatResponse, ProviderError> {
        for &idx in &self.fallback_provider_indices {
            match self.try_provider(request, idx, model) {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.retriable() => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn try_provider(
        &self,
        request: &ChatRequest,
        provider_index: usize,
        model: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let Some(slot) = self.slots.get(provider_index) else {
            return Err(ProviderError::Credentials("no provider configured".to_string()));
        };
        let mut attempt = 0u32;
        loop {
            match slot.provider.chat(request, model, request.temperature) {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    if !e.retriable() || attempt >= self.provider_retries.max(1) {
                        return Err(e);
                    }
                    std::thread::sleep(Duration::from_millis(self.provider_backoff_ms));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_core::types::Usage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AlwaysFail;
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        fn chat_with_system(
            &self,
            _system: Option<&str>,
            _user: &str,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Transient("down".into()))
        }
        fn chat(
            &self,
            _request: &ChatRequest,
            _model: &str,
            _temperature: f32,
        ) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Transient("down".into()))
        }
        fn supports_native_tools(&self) -> bool {
            false
        }
    }

    struct AlwaysOk;
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        fn chat_with_system(
            &self,
            _system: Option<&str>,
            _user: &str,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            Ok("ok".into())
        }
        fn chat(
            &self,
            _request: &ChatRequest,
            model: &str,
            _temperature: f32,
        ) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                text: Some("ok".into()),
                tool_calls: vec![],
                usage: Usage::default(),
                model: model.to_string(),
            })
        }
        fn supports_native_tools(&self) -> bool {
            false
        }
    }

    /// Fails every call and records how many times it was invoked.
    struct CountingFail(Arc<AtomicUsize>);
    impl LlmProvider for CountingFail {
        fn name(&self) -> &str {
            "counting-fail"
        }
        fn chat_with_system(
            &self,
            _system: Option<&str>,
            _user: &str,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            unimplemented!()
        }
        fn chat(
            &self,
            _request: &ChatRequest,
            _model: &str,
            _temperature: f32,
        ) -> Result<ChatResponse, ProviderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transient("down".into()))
        }
        fn supports_native_tools(&self) -> bool {
            false
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest::new(vec![], "gpt-4o-mini")
    }

    fn slots(named: Vec<(&str, Box<dyn LlmProvider>)>) -> Vec<ProviderSlot> {
        named
            .into_iter()
            .map(|(name, provider)| ProviderSlot {
                name: name.to_string(),
                provider,
            })
            .collect()
    }

    #[test]
    fn router_falls_back_to_second_provider() {
        let router = Router::new(
            slots(vec![("fast", Box::new(AlwaysFail)), ("smart", Box::new(AlwaysOk))]),
            &[],
            &["smart".to_string()],
            &[],
            1,
            0,
        );
        let resp = router.chat(&dummy_request()).unwrap();
        assert_eq!(resp.text.as_deref(), Some("ok"));
    }

    #[test]
    fn router_errors_when_all_fail() {
        let router = Router::new(
            slots(vec![("fast", Box::new(AlwaysFail)), ("smart", Box::new(AlwaysFail))]),
            &[],
            &["smart".to_string()],
            &[],
            1,
            0,
        );
        assert!(router.chat(&dummy_request()).is_err());
    }

    #[test]
    fn hint_miss_resolves_to_default_provider_unchanged() {
        let router = Router::new(
            slots(vec![("fast", Box::new(AlwaysOk)), ("smart", Box::new(AlwaysOk))]),
            &[Route {
                hint: "reasoning".into(),
                provider_name: "smart".into(),
                model: "claude-opus".into(),
                api_key: None,
            }],
            &[],
            &[],
            1,
            0,
        );
        let resolved = router.resolve("hint:nonexistent");
        assert_eq!(resolved.provider_index, 0);
        assert_eq!(resolved.model, "hint:nonexistent");
    }

    #[test]
    fn hint_hit_resolves_to_mapped_provider_and_model() {
        let router = Router::new(
            slots(vec![("fast", Box::new(AlwaysOk)), ("smart", Box::new(AlwaysOk))]),
            &[Route {
                hint: "reasoning".into(),
                provider_name: "smart".into(),
                model: "claude-opus".into(),
                api_key: None,
            }],
            &[],
            &[],
            1,
            0,
        );
        let resolved = router.resolve("hint:reasoning");
        assert_eq!(resolved.provider_index, 1);
        assert_eq!(resolved.model, "claude-opus");
    }

    #[test]
    fn route_with_unknown_provider_is_discarded_at_construction() {
        let router = Router::new(
            slots(vec![("fast", Box::new(AlwaysOk))]),
            &[Route {
                hint: "reasoning".into(),
                provider_name: "does-not-exist".into(),
                model: "whatever".into(),
                api_key: None,
            }],
            &[],
            &[],
            1,
            0,
        );
        let resolved = router.resolve("hint:reasoning");
        assert_eq!(resolved.provider_index, 0);
        assert_eq!(resolved.model, "hint:reasoning");
    }

    #[test]
    fn from_config_drops_providers_with_no_reachable_key() {
        std::env::remove_var("OLLAMA_API_KEY");
        std::env::remove_var("NULLCLAW_API_KEY");
        std::env::remove_var("API_KEY");
        let mut config = NullclawConfig::default();
        config.default_provider = "totally-unknown-provider".to_string();
        let router = Router::from_config(&config);
        assert!(router.slots.is_empty());
    }

    #[test]
    fn from_config_builds_a_slot_for_ollama_with_no_key_required() {
        let mut config = NullclawConfig::default();
        config.default_provider = "ollama".to_string();
        let router = Router::from_config(&config);
        assert_eq!(router.slots.len(), 1);
        assert_eq!(router.slots[0].name, "ollama");
    }

    #[test]
    fn chat_with_no_slots_errors_instead_of_panicking() {
        let router = Router::new(Vec::new(), &[], &[], &[], 1, 0);
        assert!(router.chat(&dummy_request()).is_err());
    }

    #[test]
    fn retries_up_to_provider_retries_before_failing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new(
            slots(vec![("solo", Box::new(CountingFail(calls.clone())))]),
            &[],
            &[],
            &[],
            3,
            0,
        );
        assert!(router.chat(&dummy_request()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
