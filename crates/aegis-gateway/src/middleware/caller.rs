//! Caller identity middleware.
//!
//! When `auth.shared_secret` is configured:
//! - Reads `x-caller-id`, `x-caller-signature`, `x-caller-issued-at`
//! - Validates the HMAC-SHA256 signature and token age
//! - Adds [`AuthenticatedCaller`] to request extensions
//! - Returns 401 if validation fails, or if no token is sent and
//!   `auth.require_caller` is set
//!
//! Without a secret every request passes through anonymously.

use crate::problem::ProblemDocument;
use crate::state::AppState;
use aegis_core::caller_token::{
    CallerToken, CALLER_ID_HEADER, CALLER_ISSUED_AT_HEADER, CALLER_SIGNATURE_HEADER,
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Verified caller identity, bound into confirm tokens and inspection metadata.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub caller_id: String,
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub async fn caller_identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.auth.secret() else {
        return next.run(request).await;
    };

    let token = CallerToken {
        caller_id: header_value(request.headers(), CALLER_ID_HEADER),
        signature: header_value(request.headers(), CALLER_SIGNATURE_HEADER),
        issued_at: header_value(request.headers(), CALLER_ISSUED_AT_HEADER),
    };

    let absent =
        token.caller_id.is_empty() && token.signature.is_empty() && token.issued_at.is_empty();
    if absent && !state.auth.require_caller {
        return next.run(request).await;
    }
    if absent {
        return ProblemDocument::caller_unauthenticated(format!(
            "A caller token is required. Provide {CALLER_ID_HEADER}, {CALLER_SIGNATURE_HEADER} \
             and {CALLER_ISSUED_AT_HEADER} headers."
        ))
        .with_instance(request.uri().path())
        .into_response();
    }

    if let Err(e) = token.validate(secret, Some(state.auth.token_ttl_seconds)) {
        tracing::warn!(caller_id = %token.caller_id, error = %e, "caller token rejected");
        return ProblemDocument::caller_unauthenticated(e.to_string())
            .with_instance(request.uri().path())
            .into_response();
    }

    request.extensions_mut().insert(AuthenticatedCaller {
        caller_id: token.caller_id,
    });
    next.run(request).await
}
