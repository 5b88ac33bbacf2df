//! Route configuration

use axum::{middleware, routing::get, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{
    caller_identity_middleware, inspection_middleware, route_match_middleware, PanicResponder,
};
use crate::state::AppState;

/// Create the application router
///
/// ## Routes
/// - GET /health - Basic health check
/// - GET /health/ready - Readiness probe (checks the inspection service)
/// - GET /health/live - Liveness probe
/// - GET /metrics - Prometheus metrics
/// - anything else - proxied to the matching route's upstream
///
/// Proxied requests pass through, outermost first:
/// 1. **Route matching**: 404 problem document when no prefix matches.
/// 2. **Caller identity**: HMAC caller token, when a shared secret is configured.
/// 3. **Inspection**: extract, inspect, evaluate and enforce.
pub fn create_router(state: AppState) -> Router {
    let proxy_routes = Router::new()
        .fallback(handlers::forward)
        .layer(middleware::from_fn_with_state(state.clone(), inspection_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), caller_identity_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), route_match_middleware));

    let panic_responder = PanicResponder {
        expose_detail: state.settings.expose_error_detail,
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .route("/health/live", get(handlers::live))
        .route("/metrics", get(handlers::metrics))
        .merge(proxy_routes)
        .layer(CatchPanicLayer::custom(panic_responder))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::forward::{ForwardError, UpstreamForwarder};
    use crate::pipeline::InspectionPipeline;
    use crate::routes::{ProxyRoute, RouteTable};
    use crate::state::GatewaySettings;
    use aegis_core::{
        CallerToken, InMemoryConfirmTokenService, InspectionClient, InspectionError,
        InspectionMeta, InspectionResponse, PolicyStore, PolicyTable, PromptExtractorRegistry,
        RouteConfig,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use axum::response::Response;
    use std::sync::Arc;
    use tower::ServiceExt; // For `oneshot`

    struct Unreachable;

    #[async_trait]
    impl InspectionClient for Unreachable {
        async fn inspect(
            &self,
            _prompt: &str,
            _meta: &InspectionMeta,
        ) -> Result<InspectionResponse, InspectionError> {
            Err(InspectionError::Transport("connection refused".to_string()))
        }

        async fn check_ready(&self) -> Result<(), InspectionError> {
            Err(InspectionError::Transport("connection refused".to_string()))
        }
    }

    struct Echo;

    #[async_trait]
    impl UpstreamForwarder for Echo {
        async fn forward(&self, route: &ProxyRoute, _request: Request) -> Result<Response, ForwardError> {
            if route.id() == "panics" {
                panic!("forwarder exploded");
            }
            Ok(Response::new(Body::from(route.id().to_string())))
        }
    }

    fn app_with(auth: AuthConfig, settings: GatewaySettings) -> Router {
        let pipeline = InspectionPipeline::new(
            Arc::new(PolicyStore::new(PolicyTable::default())),
            Arc::new(PromptExtractorRegistry::standard()),
            Arc::new(Unreachable),
            Arc::new(InMemoryConfirmTokenService::default()),
        );
        let routes = RouteTable::new([
            ProxyRoute::new(RouteConfig::new("tags"), "/api/tags", "http://upstream"),
            ProxyRoute::new(RouteConfig::new("panics"), "/boom", "http://upstream"),
        ]);
        create_router(AppState::new(pipeline, routes, Arc::new(Echo), settings, auth))
    }

    fn app() -> Router {
        app_with(AuthConfig::default(), GatewaySettings::default())
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_live_route() {
        let response = app().oneshot(get_request("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_route_reports_unavailable_inspection() {
        let response = app().oneshot(get_request("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = app().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unmatched_path_is_problem_404() {
        let response = app().oneshot(get_request("/notfound")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn test_uninspected_route_is_forwarded() {
        let response = app().oneshot(get_request("/api/tags")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-aegis-decision").is_none());
    }

    #[tokio::test]
    async fn test_panic_becomes_problem_500() {
        let response = app().oneshot(get_request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    fn secured() -> AuthConfig {
        AuthConfig {
            shared_secret: Some("s3cret".to_string()),
            require_caller: true,
            ..AuthConfig::default()
        }
    }

    #[tokio::test]
    async fn test_required_caller_missing_is_401() {
        let app = app_with(secured(), GatewaySettings::default());
        let response = app.oneshot(get_request("/api/tags")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_caller_token_is_accepted() {
        let token = CallerToken::create("chat-ui", "s3cret").unwrap();
        let request = Request::builder()
            .uri("/api/tags")
            .header("x-caller-id", &token.caller_id)
            .header("x-caller-signature", &token.signature)
            .header("x-caller-issued-at", &token.issued_at)
            .body(Body::empty())
            .unwrap();

        let app = app_with(secured(), GatewaySettings::default());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forged_caller_token_is_401() {
        let token = CallerToken::create("chat-ui", "other-secret").unwrap();
        let request = Request::builder()
            .uri("/api/tags")
            .header("x-caller-id", &token.caller_id)
            .header("x-caller-signature", &token.signature)
            .header("x-caller-issued-at", &token.issued_at)
            .body(Body::empty())
            .unwrap();

        let app = app_with(secured(), GatewaySettings::default());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_optional_caller_allows_anonymous() {
        let auth = AuthConfig {
            require_caller: false,
            ..secured()
        };
        let response = app_with(auth, GatewaySettings::default())
            .oneshot(get_request("/api/tags"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
