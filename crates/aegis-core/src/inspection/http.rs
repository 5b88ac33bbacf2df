use super::{InspectionClient, InspectionMeta, InspectionRequest, InspectionResponse};
use crate::error::InspectionError;
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub const DEFAULT_INSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP client for the inspection service.
///
/// Each call is bounded by `timeout`; there are no inline retries.
#[derive(Debug, Clone)]
pub struct HttpInspectionClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpInspectionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, timeout)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> InspectionError {
        if e.is_timeout() {
            InspectionError::Timeout(self.timeout)
        } else {
            InspectionError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl InspectionClient for HttpInspectionClient {
    async fn inspect(
        &self,
        prompt: &str,
        meta: &InspectionMeta,
    ) -> Result<InspectionResponse, InspectionError> {
        let started = Instant::now();
        let url = format!("{}/inspect", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&InspectionRequest { prompt, meta })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InspectionError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(InspectionError::EmptyBody);
        }

        let parsed: Option<InspectionResponse> =
            serde_json::from_slice(&body).map_err(|e| InspectionError::Decode(e.to_string()))?;
        let parsed = parsed.ok_or(InspectionError::EmptyBody)?;

        tracing::debug!(
            source = meta.source.as_deref(),
            findings = parsed.findings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inspection service responded"
        );
        Ok(parsed)
    }

    async fn check_ready(&self) -> Result<(), InspectionError> {
        let url = format!("{}/health/ready", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(()),
            other => Err(InspectionError::Status(other.as_u16())),
        }
    }
}
