use super::{non_blank, PromptExtractor};
use serde_json::Value;

/// Ollama completion bodies: `{ "model": "...", "prompt": "..." }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaPromptExtractor;

impl PromptExtractor for OllamaPromptExtractor {
    fn name(&self) -> &str {
        "ollama"
    }

    fn try_extract(&self, body: &[u8]) -> Option<String> {
        let root: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse Ollama request body");
                return None;
            }
        };

        root.get("prompt").and_then(Value::as_str).and_then(non_blank)
    }
}
