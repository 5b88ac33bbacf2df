//! Upstream forwarding.

use crate::problem::ProblemDocument;
use crate::routes::ProxyRoute;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, Uri};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

const GATEWAY_HEADER_PREFIX: &str = "x-aegis-";

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream request failed: {0}")]
    Unavailable(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("request body could not be read: {0}")]
    Body(String),
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        match self {
            ForwardError::Unavailable(_) => ProblemDocument::upstream_unavailable().into_response(),
            ForwardError::Timeout => ProblemDocument::upstream_timeout().into_response(),
            ForwardError::Body(detail) => ProblemDocument::body_unreadable(detail).into_response(),
        }
    }
}

/// Sends a request that passed the pipeline to its route's upstream.
#[async_trait]
pub trait UpstreamForwarder: Send + Sync {
    async fn forward(&self, route: &ProxyRoute, request: Request) -> Result<Response, ForwardError>;
}

/// `reqwest`-backed forwarder. Request bodies are buffered, response bodies
/// are streamed back.
#[derive(Debug, Clone)]
pub struct ReqwestForwarder {
    client: reqwest::Client,
    timeout: Option<Duration>,
    max_body_bytes: usize,
}

impl ReqwestForwarder {
    pub fn new(timeout: Option<Duration>, max_body_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl UpstreamForwarder for ReqwestForwarder {
    async fn forward(&self, route: &ProxyRoute, request: Request) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?;

        let url = upstream_url(&route.upstream, &parts.uri);
        let mut headers = parts.headers;
        strip_request_headers(&mut headers);

        let mut builder = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let upstream = builder.send().await.map_err(|e| {
            tracing::warn!(route_id = %route.id(), url = %url, error = %e, "upstream request failed");
            if e.is_timeout() {
                ForwardError::Timeout
            } else {
                ForwardError::Unavailable(e.to_string())
            }
        })?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_response_headers(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// `upstream` joined with the request's path and query.
pub fn upstream_url(upstream: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{}{}", upstream.trim_end_matches('/'), path_and_query)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

fn strip_gateway_headers(headers: &mut HeaderMap) {
    let names: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(GATEWAY_HEADER_PREFIX))
        .cloned()
        .collect();
    for name in names {
        headers.remove(&name);
    }
}

fn strip_request_headers(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    strip_gateway_headers(headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
}

fn strip_response_headers(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    strip_gateway_headers(headers);
    headers.remove(header::CONTENT_LENGTH);
}
