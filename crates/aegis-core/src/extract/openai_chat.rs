use super::{non_blank, PromptExtractor};
use serde_json::Value;

/// OpenAI-style chat bodies. The prompt is the `content` of the last entry in
/// `messages`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatPromptExtractor;

impl PromptExtractor for OpenAiChatPromptExtractor {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn try_extract(&self, body: &[u8]) -> Option<String> {
        let root: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse chat request body");
                return None;
            }
        };

        root.get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.last())
            .and_then(|last| last.get("content"))
            .and_then(Value::as_str)
            .and_then(non_blank)
    }
}
