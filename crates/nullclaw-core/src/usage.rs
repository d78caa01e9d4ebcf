//! Token accounting: normalize a provider's `usage` object into a stable shape.

use crate::types::Usage;

/// Parse an optional provider `usage` object into a normalized [`Usage`].
/// Missing fields default to 0. The sum of `prompt + completion` is not
/// required to equal `total` — providers disagree, and we don't recompute.
pub fn parse_usage(value: Option<&serde_json::Value>) -> Usage {
    let Some(value) = value else {
        return Usage::default();
    };
    let field = |key: &str, alt: &str| -> u32 {
        value
            .get(key)
            .or_else(|| value.get(alt))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    };
    Usage {
        prompt: field("prompt_tokens", "input_tokens"),
        completion: field("completion_tokens", "output_tokens"),
        total: field("total_tokens", "total"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_usage_defaults_to_zero() {
        let usage = parse_usage(None);
        assert_eq!(usage.prompt, 0);
        assert_eq!(usage.completion, 0);
        assert_eq!(usage.total, 0);
    }

    #[test]
    fn openai_style_usage() {
        let value = json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15});
        let usage = parse_usage(Some(&value));
        assert_eq!(usage.prompt, 10);
        assert_eq!(usage.completion, 5);
        assert_eq!(usage.total, 15);
    }

    #[test]
    fn anthropic_style_usage_no_total() {
        let value = json!({"input_tokens": 20, "output_tokens": 8});
        let usage = parse_usage(Some(&value));
        assert_eq!(usage.prompt, 20);
        assert_eq!(usage.completion, 8);
        assert_eq!(usage.total, 0);
    }
}
