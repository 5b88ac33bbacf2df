//! # Aegis Core
//!
//! Decision logic for an inline prompt-inspection gateway placed in front of
//! LLM backends.
//!
//! ## Overview
//!
//! For each request on an inspected route the gateway:
//!
//! - **Extracts** the prompt with the route's [`PromptExtractor`]
//! - **Inspects** it through an [`InspectionClient`], receiving [`Finding`]s
//! - **Evaluates** the findings against the route's [`Policy`], producing a
//!   [`PolicyAction`] (`Allow < Confirm < Block`, worst wins)
//! - For `Confirm`, **issues or consumes** a single-use token through a
//!   [`ConfirmTokenService`], bound to the exact request that was evaluated
//!
//! HTTP plumbing lives in the `aegis-gateway` crate; everything here is
//! transport-agnostic apart from [`HttpInspectionClient`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aegis_core::{evaluate, Policy, PolicyAction, PolicyStore, PolicyTable};
//! use aegis_core::{PromptExtractorRegistry, RouteConfig};
//!
//! let store = PolicyStore::new(PolicyTable::default());
//! let extractors = PromptExtractorRegistry::standard();
//!
//! let route = RouteConfig::new("ollama-generate")
//!     .with_metadata("InspectPrompt", "true")
//!     .with_metadata("PromptFormat", "ollama");
//!
//! let policy = store.policy_for_route(Some(&route));
//! let prompt = extractors.try_extract(Some(&route), br#"{"prompt":"hello"}"#);
//! assert_eq!(prompt.as_deref(), Some("hello"));
//! assert_eq!(evaluate(&policy, &[]), PolicyAction::Allow);
//! ```

pub mod caller_token;
pub mod confirm_token;
pub mod error;
pub mod extract;
pub mod finding;
pub mod inspection;
pub mod policy;
pub mod route;

// Primary exports
pub use caller_token::CallerToken;
pub use confirm_token::{
    content_hash, ConfirmTokenRequest, ConfirmTokenService, InMemoryConfirmTokenService,
};
pub use error::{CoreError, InspectionError};
pub use extract::{PromptExtractor, PromptExtractorRegistry};
pub use finding::{redact_all, Finding, RedactedFinding, Severity};
pub use inspection::{
    HttpInspectionClient, InspectionClient, InspectionMeta, InspectionResponse,
};
pub use policy::{
    evaluate, ConfirmOptions, Policy, PolicyAction, PolicyStore, PolicyTable, TypeOverride,
    DEFAULT_POLICY_ID, MAX_CONFIRM_TTL_SECONDS,
};
pub use route::RouteConfig;
