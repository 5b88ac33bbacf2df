//! Inspection pipeline: extract, inspect, evaluate, then confirm-token
//! issue or consume.
//!
//! The pipeline is HTTP-agnostic. It takes the buffered body plus the request
//! context and returns an [`Outcome`]; the middleware in
//! [`crate::middleware::inspection`] turns that into a response or forwards.

use crate::telemetry::{INSPECTION_DURATION, INSPECTION_FAILURES, POLICY_UNRESOLVED};
use aegis_core::{
    evaluate, redact_all, ConfirmTokenRequest, ConfirmTokenService, InspectionClient,
    InspectionError, InspectionMeta, Policy, PolicyAction, PolicyStore, PromptExtractorRegistry,
    RedactedFinding, RouteConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Header carrying a confirm token on the retried request.
pub const CONFIRM_TOKEN_HEADER: &str = "x-aegis-confirm-token";
/// Header reporting the decision on gateway and forwarded responses.
pub const DECISION_HEADER: &str = "x-aegis-decision";

/// Decision label for routes that do not ask for inspection.
pub const SKIPPED_LABEL: &str = "skipped";

/// Result of running the pipeline for an inspected request.
#[derive(Debug)]
pub enum Outcome {
    /// Forward upstream. `confirmed` is set when a confirm token was consumed.
    Allowed { confirmed: bool },
    /// The gateway answers the request itself.
    Rejected(Rejection),
}

/// Outcomes that stop the request at the gateway.
#[derive(Debug)]
pub enum Rejection {
    /// Inspection is enabled but no prompt could be extracted.
    Misconfigured,
    Blocked { findings: Vec<RedactedFinding> },
    ConfirmRequired {
        token: String,
        ttl: Duration,
        findings: Vec<RedactedFinding>,
    },
    /// A confirm token was presented but did not validate.
    ConfirmInvalid,
    InspectionFailed(InspectionError),
}

impl Outcome {
    /// Label used for logging and the decisions counter.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Allowed { confirmed: false } => "allow",
            Outcome::Allowed { confirmed: true } => "allow_confirmed",
            Outcome::Rejected(rejection) => rejection.label(),
        }
    }
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Misconfigured => "misconfigured",
            Rejection::Blocked { .. } => "block",
            Rejection::ConfirmRequired { .. } => "confirm",
            Rejection::ConfirmInvalid => "confirm_invalid",
            Rejection::InspectionFailed(_) => "inspection_failed",
        }
    }
}

impl From<Rejection> for Outcome {
    fn from(rejection: Rejection) -> Self {
        Outcome::Rejected(rejection)
    }
}

/// Request context the pipeline needs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRequest<'a> {
    pub route: &'a RouteConfig,
    pub policy: &'a Policy,
    pub caller: Option<&'a str>,
    pub body: &'a [u8],
    pub confirm_token: Option<&'a str>,
}

pub struct InspectionPipeline {
    policies: Arc<PolicyStore>,
    extractors: Arc<PromptExtractorRegistry>,
    inspection: Arc<dyn InspectionClient>,
    confirm_tokens: Arc<dyn ConfirmTokenService>,
}

impl InspectionPipeline {
    pub fn new(
        policies: Arc<PolicyStore>,
        extractors: Arc<PromptExtractorRegistry>,
        inspection: Arc<dyn InspectionClient>,
        confirm_tokens: Arc<dyn ConfirmTokenService>,
    ) -> Self {
        Self {
            policies,
            extractors,
            inspection,
            confirm_tokens,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn extractors(&self) -> &PromptExtractorRegistry {
        &self.extractors
    }

    pub fn inspection(&self) -> &Arc<dyn InspectionClient> {
        &self.inspection
    }

    /// Whether `route` opts in to inspection.
    pub fn is_enabled(route: Option<&RouteConfig>) -> bool {
        route.is_some_and(RouteConfig::inspect_prompt)
    }

    /// Policy for `route`, counting explicit references to unknown ids.
    pub fn resolve_policy(&self, route: &RouteConfig) -> Policy {
        let policy = self.policies.policy_for_route(Some(route));
        if route.policy_id().is_some() && !self.policies.contains(&policy.id) {
            metrics::counter!(POLICY_UNRESOLVED).increment(1);
        }
        policy
    }

    pub async fn run(&self, request: PipelineRequest<'_>) -> Outcome {
        let route = request.route;
        let policy = request.policy;

        let Some(prompt) = self.extractors.try_extract(Some(route), request.body) else {
            tracing::error!(
                route_id = %route.id,
                policy_id = %policy.id,
                format = route.prompt_format(),
                "prompt inspection enabled but no prompt could be extracted"
            );
            return Rejection::Misconfigured.into();
        };

        let meta = InspectionMeta {
            user_id: request.caller.map(str::to_string),
            source: Some(route.id.clone()),
        };

        let started = Instant::now();
        let result = self.inspection.inspect(&prompt, &meta).await;
        let elapsed = started.elapsed();
        metrics::histogram!(INSPECTION_DURATION).record(elapsed.as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    route_id = %route.id,
                    policy_id = %policy.id,
                    kind = error.kind(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %error,
                    "prompt inspection failed"
                );
                metrics::counter!(INSPECTION_FAILURES, "kind" => error.kind()).increment(1);
                return Rejection::InspectionFailed(error).into();
            }
        };

        let findings = &response.findings;
        let action = evaluate(policy, findings);
        tracing::info!(
            route_id = %route.id,
            policy_id = %policy.id,
            decision = action.as_str(),
            finding_count = findings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "prompt inspected"
        );

        match action {
            PolicyAction::Allow => Outcome::Allowed { confirmed: false },
            PolicyAction::Block => Rejection::Blocked {
                findings: redact_all(findings),
            }
            .into(),
            PolicyAction::Confirm => {
                let binding = ConfirmTokenRequest::for_request(
                    &policy.id,
                    Some(&route.id),
                    request.caller,
                    request.body,
                    &prompt,
                );

                match request.confirm_token {
                    Some(token) if self.confirm_tokens.try_consume_token(token, &binding) => {
                        Outcome::Allowed { confirmed: true }
                    }
                    Some(_) => {
                        tracing::warn!(
                            route_id = %route.id,
                            policy_id = %policy.id,
                            "confirm token rejected"
                        );
                        Rejection::ConfirmInvalid.into()
                    }
                    None => {
                        let ttl = policy.confirm_ttl();
                        let token = self.confirm_tokens.issue_token(binding, ttl);
                        Rejection::ConfirmRequired {
                            token,
                            ttl,
                            findings: redact_all(findings),
                        }
                        .into()
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for InspectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectionPipeline")
            .field("extractors", &self.extractors)
            .finish_non_exhaustive()
    }
}
