//! Error types for Aegis core.

/// Errors raised by core components outside the inspection round trip.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid caller token (bad signature, missing fields).
    #[error("Invalid caller token: {0}")]
    InvalidCallerToken(String),

    /// Caller token has expired.
    #[error("Caller token expired: {0}")]
    ExpiredCallerToken(String),

    /// A policy definition could not be accepted.
    #[error("Invalid policy configuration: {0}")]
    InvalidPolicy(String),
}

/// Failures talking to the external inspection service.
///
/// Every variant is a hard failure: callers must never treat it as "no findings".
#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    /// The service could not be reached or the connection broke mid-request.
    #[error("inspection service unreachable: {0}")]
    Transport(String),

    /// The round trip exceeded the configured timeout.
    #[error("inspection service timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The service answered with a non-success status.
    #[error("inspection service returned status {0}")]
    Status(u16),

    /// A success status with a null or empty body.
    #[error("inspection service returned an empty body")]
    EmptyBody,

    /// The body did not match the response contract.
    #[error("inspection service response could not be decoded: {0}")]
    Decode(String),
}

impl InspectionError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InspectionError::Transport(_) => "transport",
            InspectionError::Timeout(_) => "timeout",
            InspectionError::Status(_) => "status",
            InspectionError::EmptyBody => "empty_body",
            InspectionError::Decode(_) => "decode",
        }
    }
}
