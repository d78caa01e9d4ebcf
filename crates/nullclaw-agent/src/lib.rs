//! Provider abstraction, the hint/fallback router, and the built-in
//! provider registry.

pub mod anthropic;
pub mod claude_cli;
pub mod cli;
pub mod codex_cli;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod openai_codex;
pub mod provider;
pub mod registry;
pub mod router;

pub use provider::{LlmProvider, ProviderError, ProviderHolder};
pub use router::{ProviderSlot, Router};
