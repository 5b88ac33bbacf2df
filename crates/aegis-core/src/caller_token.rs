//! Caller identity tokens signed with HMAC-SHA256.
//!
//! A caller proves its identity by sending `caller_id`, `issued_at` and the
//! hex HMAC of `caller_id|issued_at` under a secret shared with the gateway.
//! The verified `caller_id` becomes the user id bound into confirm tokens and
//! sent to the inspection service.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TTL_SECONDS: i64 = 300;
const MAX_CLOCK_SKEW_SECONDS: i64 = 30;

/// Header carrying the caller id.
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Header carrying the hex HMAC signature.
pub const CALLER_SIGNATURE_HEADER: &str = "x-caller-signature";
/// Header carrying the RFC 3339 issue time.
pub const CALLER_ISSUED_AT_HEADER: &str = "x-caller-issued-at";

/// HMAC-signed caller identity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallerToken {
    pub caller_id: String,
    /// Hex HMAC-SHA256 of `caller_id|issued_at`.
    pub signature: String,
    /// RFC 3339 timestamp.
    pub issued_at: String,
}

impl CallerToken {
    /// Sign a token for `caller_id` issued now.
    pub fn create(caller_id: &str, shared_secret: &str) -> Result<Self, CoreError> {
        Self::create_at(caller_id, shared_secret, Utc::now())
    }

    /// Sign a token for `caller_id` with an explicit issue time.
    pub fn create_at(
        caller_id: &str,
        shared_secret: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if caller_id.is_empty() {
            return Err(CoreError::InvalidCallerToken(
                "caller_id must not be empty".to_string(),
            ));
        }
        if shared_secret.is_empty() {
            return Err(CoreError::InvalidCallerToken(
                "shared_secret must not be empty".to_string(),
            ));
        }

        let issued_at = issued_at.to_rfc3339();
        let mac = keyed_mac(caller_id, &issued_at, shared_secret)?;

        Ok(Self {
            caller_id: caller_id.to_string(),
            signature: hex::encode(mac.finalize().into_bytes()),
            issued_at,
        })
    }

    /// Verify signature and age. `ttl_seconds` defaults to five minutes.
    pub fn validate(&self, shared_secret: &str, ttl_seconds: Option<i64>) -> Result<(), CoreError> {
        let ttl = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);

        for (field, value) in [
            ("caller_id", &self.caller_id),
            ("signature", &self.signature),
            ("issued_at", &self.issued_at),
        ] {
            if value.is_empty() {
                return Err(CoreError::InvalidCallerToken(format!("{field} is empty")));
            }
        }

        let sig_bytes = hex::decode(&self.signature).map_err(|_| {
            CoreError::InvalidCallerToken("signature is not valid hex".to_string())
        })?;

        // verify_slice compares in constant time
        keyed_mac(&self.caller_id, &self.issued_at, shared_secret)?
            .verify_slice(&sig_bytes)
            .map_err(|_| CoreError::InvalidCallerToken("signature mismatch".to_string()))?;

        let issued_at: DateTime<Utc> = self.issued_at.parse().map_err(|_| {
            CoreError::InvalidCallerToken("invalid issued_at timestamp (expected RFC 3339)".to_string())
        })?;

        let age = Utc::now().signed_duration_since(issued_at).num_seconds();
        if age > ttl {
            return Err(CoreError::ExpiredCallerToken(format!(
                "age: {age}s, TTL: {ttl}s"
            )));
        }
        if age < -MAX_CLOCK_SKEW_SECONDS {
            return Err(CoreError::InvalidCallerToken(
                "issued_at is in the future".to_string(),
            ));
        }

        Ok(())
    }
}

fn keyed_mac(caller_id: &str, issued_at: &str, secret: &str) -> Result<HmacSha256, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::InvalidCallerToken(format!("HMAC error: {e}")))?;
    mac.update(caller_id.as_bytes());
    mac.update(b"|");
    mac.update(issued_at.as_bytes());
    Ok(mac)
}
