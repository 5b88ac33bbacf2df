//! RFC 7807 problem documents.
//!
//! Every response the gateway produces on its own (block, confirm, failures)
//! is an `application/problem+json` body. Finding snippets never appear here.

use aegis_core::RedactedFinding;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Problem type URIs.
pub mod types {
    pub const POLICY_BLOCKED: &str = "https://aegis-gateway/errors/policy-blocked";
    pub const CONFIRMATION_REQUIRED: &str = "https://aegis-gateway/errors/confirmation-required";
    pub const INVALID_CONFIRM_TOKEN: &str = "https://aegis-gateway/errors/invalid-confirm-token";
    pub const PROMPT_EXTRACTION_FAILED: &str =
        "https://aegis-gateway/errors/prompt-extraction-failed";
    pub const INSPECTION_UNAVAILABLE: &str = "https://aegis-gateway/errors/inspection-unavailable";
    pub const REQUEST_BODY_UNREADABLE: &str =
        "https://aegis-gateway/errors/request-body-unreadable";
    pub const ROUTE_NOT_FOUND: &str = "https://aegis-gateway/errors/route-not-found";
    pub const CALLER_UNAUTHENTICATED: &str = "https://aegis-gateway/errors/caller-unauthenticated";
    pub const UPSTREAM_UNAVAILABLE: &str = "https://aegis-gateway/errors/upstream-unavailable";
    pub const UPSTREAM_TIMEOUT: &str = "https://aegis-gateway/errors/upstream-timeout";
    pub const INTERNAL_ERROR: &str = "https://tools.ietf.org/html/rfc9110#section-15.6.1";
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl ProblemDocument {
    pub fn new(status: StatusCode, kind: &str, title: &str) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.to_string(),
            status: status.as_u16(),
            detail: None,
            instance: None,
            extensions: Map::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Add an extension member. Values that fail to serialize are skipped.
    pub fn with_extension(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extensions.insert(key.to_string(), value);
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn policy_blocked(policy_id: &str, findings: &[RedactedFinding]) -> Self {
        Self::new(StatusCode::FORBIDDEN, types::POLICY_BLOCKED, "Request blocked by policy")
            .with_detail("The prompt was rejected by the inspection policy for this route.")
            .with_extension("policyId", policy_id)
            .with_extension("decision", "block")
            .with_extension("findings", findings)
    }

    pub fn confirmation_required(
        status: StatusCode,
        policy_id: &str,
        token: &str,
        ttl: Duration,
        findings: &[RedactedFinding],
    ) -> Self {
        Self::new(status, types::CONFIRMATION_REQUIRED, "Confirmation required")
            .with_detail(format!(
                "Resend the identical request with the {} header to proceed.",
                crate::pipeline::CONFIRM_TOKEN_HEADER
            ))
            .with_extension("policyId", policy_id)
            .with_extension("decision", "confirm")
            .with_extension("confirmToken", token)
            .with_extension("confirmTtlSeconds", ttl.as_secs())
            .with_extension("findings", findings)
    }

    pub fn invalid_confirm_token(policy_id: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            types::INVALID_CONFIRM_TOKEN,
            "Invalid confirmation token",
        )
        .with_detail(
            "The confirmation token is missing, expired, already used, or does not match this \
             request. Resend the original request without the token to obtain a new one.",
        )
        .with_extension("policyId", policy_id)
        .with_extension("decision", "confirm")
    }

    pub fn prompt_extraction_failed(policy_id: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            types::PROMPT_EXTRACTION_FAILED,
            "Prompt inspection misconfigured",
        )
        .with_detail(
            "Prompt inspection is enabled for this route, but the gateway could not extract a \
             prompt from the request.",
        )
        .with_extension("policyId", policy_id)
    }

    pub fn inspection_unavailable(policy_id: &str) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            types::INSPECTION_UNAVAILABLE,
            "Prompt inspection unavailable",
        )
        .with_detail("The prompt could not be inspected, so the request was not forwarded.")
        .with_extension("policyId", policy_id)
    }

    pub fn inspection_unavailable_blocked(policy_id: &str) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            types::INSPECTION_UNAVAILABLE,
            "Request blocked by policy",
        )
        .with_detail("The prompt could not be inspected and uninspected prompts are blocked.")
        .with_extension("policyId", policy_id)
        .with_extension("decision", "block")
    }

    pub fn body_unreadable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            types::REQUEST_BODY_UNREADABLE,
            "Request body unreadable",
        )
        .with_detail(detail)
    }

    pub fn route_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, types::ROUTE_NOT_FOUND, "Route not found")
            .with_detail("No route is configured for this path.")
    }

    pub fn caller_unauthenticated(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            types::CALLER_UNAUTHENTICATED,
            "Caller authentication failed",
        )
        .with_detail(detail)
    }

    pub fn upstream_unavailable() -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            types::UPSTREAM_UNAVAILABLE,
            "Upstream unavailable",
        )
        .with_detail("The upstream service could not be reached.")
    }

    pub fn upstream_timeout() -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            types::UPSTREAM_TIMEOUT,
            "Upstream timeout",
        )
        .with_detail("The upstream service did not respond in time.")
    }

    pub fn internal_error(trace_id: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            types::INTERNAL_ERROR,
            "Internal Server Error",
        )
        .with_extension("traceId", trace_id)
    }
}

impl IntoResponse for ProblemDocument {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match serde_json::to_vec(&self) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize problem document");
                return status.into_response();
            }
        };

        (
            status,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE)),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
            body,
        )
            .into_response()
    }
}
