//! Prompt inspection middleware.
//!
//! Runs on every matched route. Routes without `InspectPrompt=true` pass
//! straight through; otherwise the body is buffered, run through the
//! [`InspectionPipeline`](crate::pipeline::InspectionPipeline), and either
//! answered here or rebuilt and handed to the next layer.

use crate::config::FailureMode;
use crate::middleware::caller::AuthenticatedCaller;
use crate::pipeline::{
    InspectionPipeline, Outcome, PipelineRequest, Rejection, CONFIRM_TOKEN_HEADER, DECISION_HEADER,
    SKIPPED_LABEL,
};
use crate::problem::ProblemDocument;
use crate::routes::MatchedRoute;
use crate::state::{AppState, GatewaySettings};
use crate::telemetry::PIPELINE_DECISIONS;
use aegis_core::Policy;
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn inspection_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedRoute>()
        .map(|matched| matched.0.clone())
        .filter(|route| InspectionPipeline::is_enabled(Some(&route.config)));

    let Some(route) = route else {
        record(SKIPPED_LABEL);
        return next.run(request).await;
    };

    let policy = state.pipeline.resolve_policy(&route.config);
    let instance = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(route_id = %route.id(), error = %e, "request body unreadable");
            return ProblemDocument::body_unreadable(format!(
                "The request body could not be read or exceeds {} bytes.",
                state.settings.max_body_bytes
            ))
            .with_instance(instance)
            .into_response();
        }
    };

    let caller = parts
        .extensions
        .get::<AuthenticatedCaller>()
        .map(|c| c.caller_id.as_str());
    // A present but blank or non-visible-ASCII header still counts as a
    // presented token and fails to consume.
    let confirm_token = parts
        .headers
        .get(CONFIRM_TOKEN_HEADER)
        .map(|v| v.to_str().map(str::trim).unwrap_or_default());

    let outcome = state
        .pipeline
        .run(PipelineRequest {
            route: &route.config,
            policy: &policy,
            caller,
            body: &bytes,
            confirm_token,
        })
        .await;
    record(outcome.label());

    match outcome {
        Outcome::Allowed { .. } => {
            let request = Request::from_parts(parts, Body::from(bytes));
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(DECISION_HEADER, HeaderValue::from_static("allow"));
            response
        }
        Outcome::Rejected(rejection) => reject(rejection, &policy, &state.settings, instance),
    }
}

fn record(label: &'static str) {
    metrics::counter!(PIPELINE_DECISIONS, "decision" => label).increment(1);
}

/// Response for every outcome that stops the request at the gateway.
fn reject(
    rejection: Rejection,
    policy: &Policy,
    settings: &GatewaySettings,
    instance: String,
) -> Response {
    let mut issued_token = None;
    let (problem, decision) = match rejection {
        Rejection::Blocked { findings } => {
            (ProblemDocument::policy_blocked(&policy.id, &findings), Some("block"))
        }
        Rejection::ConfirmRequired { token, ttl, findings } => {
            let problem = ProblemDocument::confirmation_required(
                settings.confirm_status,
                &policy.id,
                &token,
                ttl,
                &findings,
            );
            issued_token = Some(token);
            (problem, Some("confirm"))
        }
        Rejection::ConfirmInvalid => (
            ProblemDocument::invalid_confirm_token(&policy.id),
            Some("confirm"),
        ),
        Rejection::InspectionFailed(_) => match settings.on_failure {
            FailureMode::BadGateway => (ProblemDocument::inspection_unavailable(&policy.id), None),
            FailureMode::Block => (
                ProblemDocument::inspection_unavailable_blocked(&policy.id),
                Some("block"),
            ),
        },
        Rejection::Misconfigured => (ProblemDocument::prompt_extraction_failed(&policy.id), None),
    };

    let mut response = problem.with_instance(instance).into_response();
    let headers = response.headers_mut();
    if let Some(decision) = decision {
        headers.insert(DECISION_HEADER, HeaderValue::from_static(decision));
    }
    if let Some(token) = issued_token.and_then(|t| HeaderValue::from_str(&t).ok()) {
        headers.insert(CONFIRM_TOKEN_HEADER, token);
    }
    response
}
