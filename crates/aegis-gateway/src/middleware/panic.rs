//! Converts handler panics into 500 problem documents.

use crate::problem::ProblemDocument;
use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use std::any::Any;
use tower_http::catch_panic::ResponseForPanic;

#[derive(Debug, Clone, Copy)]
pub struct PanicResponder {
    /// Include the panic message in `detail` (development only).
    pub expose_detail: bool,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let message = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "unknown panic payload".to_string()
        };

        let trace_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(trace_id = %trace_id, panic = %message, "request handler panicked");

        let mut problem = ProblemDocument::internal_error(&trace_id);
        if self.expose_detail {
            problem = problem.with_detail(message);
        }
        problem.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_hides_detail_in_production() {
        let mut responder = PanicResponder { expose_detail: false };
        let response = responder.response_for_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["title"], "Internal Server Error");
        assert!(json["traceId"].as_str().is_some());
        assert!(json.get("detail").is_none());
    }

    #[tokio::test]
    async fn test_exposes_detail_in_development() {
        let mut responder = PanicResponder { expose_detail: true };
        let response = responder.response_for_panic(Box::new("boom".to_string()));
        assert_eq!(body_json(response).await["detail"], "boom");
    }

    // CatchPanicLayer only sees panics that unwind.
    #[test]
    fn test_release_profile_keeps_unwinding() {
        let manifest = include_str!("../../../../Cargo.toml");
        assert!(!manifest.lines().any(|line| {
            let line = line.split('#').next().unwrap_or_default();
            line.replace(' ', "").starts_with("panic=\"abort\"")
        }));
    }
}
