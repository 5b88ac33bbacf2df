//! Route matching middleware.
//!
//! Resolves the request path against the route table and stores the match as
//! a [`MatchedRoute`] extension. Unmatched paths get a 404 problem document.

use crate::problem::ProblemDocument;
use crate::routes::MatchedRoute;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn route_match_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.routes.match_path(request.uri().path()) {
        Some(route) => {
            tracing::debug!(route_id = %route.id(), path = request.uri().path(), "route matched");
            request.extensions_mut().insert(MatchedRoute(route));
            next.run(request).await
        }
        None => {
            tracing::debug!(path = request.uri().path(), "no route matched");
            ProblemDocument::route_not_found()
                .with_instance(request.uri().path())
                .into_response()
        }
    }
}
