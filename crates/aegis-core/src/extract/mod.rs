//! Prompt extraction strategies.
//!
//! Each backend wire format gets one [`PromptExtractor`]. The
//! [`PromptExtractorRegistry`] maps the route's `PromptFormat` metadata to an
//! extractor. The set is closed and built once at startup: formats are
//! registered explicitly, never discovered.
//!
//! Extraction failure is an expected outcome, reported as `None`. The caller
//! treats it as a route misconfiguration.

mod ollama;
mod openai_chat;

pub use ollama::OllamaPromptExtractor;
pub use openai_chat::OpenAiChatPromptExtractor;

use crate::route::RouteConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Pulls the literal prompt text out of a request body.
pub trait PromptExtractor: Send + Sync {
    /// Format name matched against route metadata (case-insensitive).
    fn name(&self) -> &str;

    /// The prompt, or `None` if the body does not have the expected shape or
    /// the prompt is empty/whitespace-only. Must never panic on bad input.
    fn try_extract(&self, body: &[u8]) -> Option<String>;
}

/// Case-insensitive table of extractors keyed by format name.
#[derive(Clone, Default)]
pub struct PromptExtractorRegistry {
    extractors: HashMap<String, Arc<dyn PromptExtractor>>,
}

impl PromptExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format.
    pub fn standard() -> Self {
        Self::new()
            .register(OllamaPromptExtractor)
            .register(OpenAiChatPromptExtractor)
    }

    /// Add an extractor. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<E>(mut self, extractor: E) -> Self
    where
        E: PromptExtractor + 'static,
    {
        self.extractors
            .insert(extractor.name().to_ascii_lowercase(), Arc::new(extractor));
        self
    }

    pub fn get(&self, format: &str) -> Option<&Arc<dyn PromptExtractor>> {
        self.extractors.get(&format.trim().to_ascii_lowercase())
    }

    pub fn contains(&self, format: &str) -> bool {
        self.get(format).is_some()
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.extractors.values().map(|e| e.name()).collect();
        names.sort_unstable();
        names
    }

    /// Extract the prompt for `route` from `body`.
    ///
    /// `None` for a missing route, missing `PromptFormat`, an unregistered
    /// format, or a body the extractor rejects.
    pub fn try_extract(&self, route: Option<&RouteConfig>, body: &[u8]) -> Option<String> {
        let route = route?;
        let Some(format) = route.prompt_format() else {
            tracing::debug!(route_id = %route.id, "route has no PromptFormat metadata");
            return None;
        };
        let Some(extractor) = self.get(format) else {
            tracing::debug!(route_id = %route.id, format, "no extractor registered for format");
            return None;
        };
        extractor.try_extract(body)
    }
}

impl std::fmt::Debug for PromptExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptExtractorRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

/// Non-blank string, or `None`.
fn non_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
