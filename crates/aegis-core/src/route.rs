//! Route identity and the opaque metadata the pipeline consults.

use std::collections::BTreeMap;

/// Metadata key enabling inspection (`"true"`, case-insensitive).
pub const INSPECT_PROMPT_KEY: &str = "InspectPrompt";
/// Metadata key naming the prompt extractor.
pub const PROMPT_FORMAT_KEY: &str = "PromptFormat";
/// Metadata key naming the policy.
pub const POLICY_ID_KEY: &str = "PolicyId";

/// Static configuration of a proxied route as seen by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteConfig {
    pub id: String,
    metadata: BTreeMap<String, String>,
}

impl RouteConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn from_metadata(id: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }

    /// Look up a metadata value. Keys match case-insensitively because
    /// configuration sources do not agree on key casing.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .or_else(|| {
                self.metadata
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Whether the route opted into prompt inspection.
    pub fn inspect_prompt(&self) -> bool {
        self.metadata(INSPECT_PROMPT_KEY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn prompt_format(&self) -> Option<&str> {
        self.metadata(PROMPT_FORMAT_KEY)
    }

    /// Trimmed policy id, `None` when missing or blank.
    pub fn policy_id(&self) -> Option<&str> {
        self.metadata(POLICY_ID_KEY)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
