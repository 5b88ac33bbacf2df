//! Boundary to the external inspection service.
//!
//! The gateway never detects anything itself. It sends the extracted prompt to
//! the service and receives [`Finding`]s back. [`InspectionClient`] is the seam;
//! [`HttpInspectionClient`] is the production implementation.

mod http;

pub use http::{HttpInspectionClient, DEFAULT_INSPECTION_TIMEOUT};

use crate::error::InspectionError;
use crate::finding::Finding;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provenance sent alongside a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionMeta {
    /// Authenticated caller, `None` for anonymous requests.
    pub user_id: Option<String>,
    /// Route id the prompt arrived on.
    pub source: Option<String>,
}

/// `POST /inspect` request body.
#[derive(Debug, Clone, Serialize)]
pub struct InspectionRequest<'a> {
    pub prompt: &'a str,
    pub meta: &'a InspectionMeta,
}

/// `POST /inspect` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionResponse {
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// Sends prompts to the inspection service.
#[async_trait]
pub trait InspectionClient: Send + Sync {
    /// Inspect `prompt`. Any failure is an error, never an empty finding list.
    async fn inspect(
        &self,
        prompt: &str,
        meta: &InspectionMeta,
    ) -> Result<InspectionResponse, InspectionError>;

    /// Readiness of the service (`GET /health/ready` must answer 200).
    async fn check_ready(&self) -> Result<(), InspectionError>;
}
