//! Fallback handler that forwards matched requests upstream

use crate::problem::ProblemDocument;
use crate::routes::MatchedRoute;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};

pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let Some(MatchedRoute(route)) = request.extensions().get::<MatchedRoute>().cloned() else {
        return ProblemDocument::route_not_found().into_response();
    };

    match state.forwarder.forward(&route, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
