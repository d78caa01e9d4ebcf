//! Shared base for providers that delegate to a local CLI subprocess
//! (`claude -p`, `codex exec`, ...). Each CLI speaks `--output-format json`
//! and returns `{"result": "...", "usage": {...}}` on stdout.

use std::process::{Command, Stdio};

use nullclaw_core::types::{ChatRequest, ChatResponse, Role, Usage};
use tracing::debug;

use crate::provider::{LlmProvider, ProviderError};

/// A provider that shells out to a CLI binary for each chat turn. Tool
/// execution is left to the CLI itself; this provider never sees tool calls.
pub struct CliProvider {
    name: String,
    command: String,
    extra_args: Vec<String>,
}

impl CliProvider {
    pub fn new(name: impl Into<String>, command: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            extra_args,
        }
    }

    fn format_prompt(messages: &[nullclaw_core::types::Message]) -> (Option<String>, String) {
        let mut system = None;
        let mut turns = Vec::new();
        for m in messages {
            match m.role {
                Role::System => system = Some(m.content.clone()),
                Role::User => turns.push(format!("User: {}", m.content)),
                Role::Assistant => turns.push(format!("Assistant: {}", m.content)),
                Role::Tool => turns.push(format!("Tool: {}", m.content)),
            }
        }
        (system, turns.join("\n"))
    }
}

impl LlmProvider for CliProvider {
    fn name(&self) -> &str {
        &self.name
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
        let (system, prompt) = Self::format_prompt(&request.messages);

        let sys_file = system
            .map(|s| {
                let file = tempfile::Builder::new()
                    .prefix("nullclaw-sys-")
                    .suffix(".txt")
                    .tempfile()
                    .map_err(|e| ProviderError::Transient(format!("temp file: {e}")))?;
                std::fs::write(file.path(), &s)
                    .map_err(|e| ProviderError::Transient(format!("write system prompt: {e}")))?;
                Ok::<_, ProviderError>(file)
            })
            .transpose()?;

        let mut cmd = Command::new(&self.command);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(model);
        if let Some(file) = &sys_file {
            cmd.arg("--system-prompt-file").arg(file.path());
        }
        for arg in &self.extra_args {
            cmd.arg(arg);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = %self.command, %model, prompt_len = prompt.len(), "spawning CLI provider");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::Credentials(format!("{} CLI not found at '{}'", self.name, self.command))
            } else {
                ProviderError::Transient(format!("failed to spawn {}: {e}", self.name))
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            use std::io::Write;
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| ProviderError::Transient(format!("write stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ProviderError::Transient(format!("{} process error: {e}", self.name)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Malformed(format!(
                "{} exited with {}: {stderr}",
                self.name,
                output.status.code().unwrap_or(-1)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| ProviderError::Malformed(format!("{} JSON parse: {e}", self.name)))?;

        if json.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false) {
            let msg = json
                .get("result")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown CLI error");
            return Err(ProviderError::Malformed(msg.to_string()));
        }

        let text = json.get("result").and_then(|v| v.as_str()).map(str::to_string);
        let prompt_tokens = json.pointer("/usage/input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let completion_tokens = json.pointer("/usage/output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

        Ok(ChatResponse {
            text,
            tool_calls: Vec::new(),
            usage: Usage {
                prompt: prompt_tokens,
                completion: completion_tokens,
                total: prompt_tokens + completion_tokens,
            },
            model: model.to_string(),
        })
    }

    fn supports_native_tools(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_core::types::Message;

    #[test]
    fn format_prompt_separates_system_from_turns() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let (system, prompt) = CliProvider::format_prompt(&messages);
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(prompt, "User: hi\nAssistant: hello");
    }

    #[test]
    fn unknown_binary_surfaces_as_credentials_error() {
        let provider = CliProvider::new("test-cli", "definitely-not-a-real-binary", vec![]);
        let request = ChatRequest::new(vec![Message::user("hi")], "test-model");
        let err = provider.chat(&request, "test-model", 0.5).unwrap_err();
        assert!(matches!(err, ProviderError::Credentials(_)));
    }
}
