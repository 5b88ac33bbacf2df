//! Gateway configuration.
//!
//! Loaded with the `config` crate from a TOML file (optional) overlaid with
//! `AEGIS__`-prefixed environment variables, e.g.
//! `AEGIS__INSPECTION__BASE_URL=http://inspection:8000`. `PORT` overrides the
//! listen port for container platforms.

use aegis_core::{Policy, PolicyTable};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Default configuration file, overridable with `AEGIS_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "aegis.toml";

const ENV_PREFIX: &str = "AEGIS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Policy(#[from] aegis_core::CoreError),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[validate(nested)]
    pub inspection: InspectionConfig,
    #[validate(nested)]
    pub confirm: ConfirmConfig,
    pub auth: AuthConfig,
    /// Policies keyed by id (case-insensitive).
    pub policies: HashMap<String, Policy>,
    #[validate(nested)]
    pub routes: Vec<RouteSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    /// `development` exposes panic details in 500 responses.
    pub environment: Environment,
    /// Largest request body the gateway buffers.
    #[validate(range(min = 1))]
    pub max_body_bytes: usize,
    /// Upstream forwarding timeout; `0` disables it.
    pub upstream_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Production,
            max_body_bytes: 10 * 1024 * 1024,
            upstream_timeout_seconds: 300,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        (self.upstream_timeout_seconds > 0).then(|| Duration::from_secs(self.upstream_timeout_seconds))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

/// What the gateway does when the inspection service fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// 502 problem document.
    #[default]
    BadGateway,
    /// 403 problem document with decision `block`.
    Block,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct InspectionConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
    pub on_failure: FailureMode,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_seconds: 10,
            on_failure: FailureMode::BadGateway,
        }
    }
}

impl InspectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Status code of the "confirmation required" response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u16")]
pub enum ConfirmStatus {
    /// 428 Precondition Required.
    #[default]
    PreconditionRequired,
    /// 409 Conflict.
    Conflict,
}

impl ConfirmStatus {
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            ConfirmStatus::PreconditionRequired => axum::http::StatusCode::PRECONDITION_REQUIRED,
            ConfirmStatus::Conflict => axum::http::StatusCode::CONFLICT,
        }
    }
}

impl TryFrom<u16> for ConfirmStatus {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            428 => Ok(ConfirmStatus::PreconditionRequired),
            409 => Ok(ConfirmStatus::Conflict),
            other => Err(format!("confirm.status_code must be 428 or 409, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ConfirmConfig {
    pub status_code: ConfirmStatus,
    /// Maximum number of outstanding confirm tokens.
    #[validate(range(min = 1))]
    pub capacity: usize,
    #[validate(range(min = 1))]
    pub sweep_interval_seconds: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            status_code: ConfirmStatus::PreconditionRequired,
            capacity: aegis_core::confirm_token::DEFAULT_CAPACITY,
            sweep_interval_seconds: 30,
        }
    }
}

/// Caller authentication. Without a shared secret every caller is anonymous.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub shared_secret: Option<String>,
    /// Reject requests that carry no caller token.
    pub require_caller: bool,
    pub token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            require_caller: false,
            token_ttl_seconds: aegis_core::caller_token::DEFAULT_TTL_SECONDS,
        }
    }
}

impl AuthConfig {
    /// Configured non-empty secret.
    pub fn secret(&self) -> Option<&str> {
        self.shared_secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// One proxied route.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RouteSettings {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub path_prefix: String,
    #[validate(url)]
    pub upstream: String,
    /// Opaque metadata (`InspectPrompt`, `PromptFormat`, `PolicyId`, ...).
    pub metadata: BTreeMap<String, String>,
}

impl GatewayConfig {
    /// Load from `path` (if it exists) and the environment, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: GatewayConfig = settings.try_deserialize()?;
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        config.check()?;
        Ok(config)
    }

    /// Parse a TOML document (no environment overlay).
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Validation beyond what the field attributes express.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.id.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "route id '{}' is defined more than once",
                    route.id
                )));
            }
            if !route.path_prefix.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "route '{}': path_prefix must start with '/'",
                    route.id
                )));
            }
        }

        // Surfaces duplicate policy ids early.
        self.policy_table()?;
        Ok(())
    }

    pub fn policy_table(&self) -> Result<PolicyTable, ConfigError> {
        Ok(PolicyTable::from_map(self.policies.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::PolicyAction;

    const SAMPLE: &str = r#"
[server]
port = 9090
environment = "development"

[inspection]
base_url = "http://inspection:8000"
timeout_seconds = 5
on_failure = "block"

[confirm]
status_code = 409

[policies.Default]
default_action = "confirm"

[policies.Strict]
default_action = "block"
confirm = { ttl_seconds = 30 }

[policies.Strict.type_overrides.pii_email]
action = "allow"

[[routes]]
id = "ollama-generate"
path_prefix = "/api/generate"
upstream = "http://ollama:11434"

[routes.metadata]
InspectPrompt = "true"
PromptFormat = "ollama"
PolicyId = "Strict"

[[routes]]
id = "ollama-tags"
path_prefix = "/api/tags"
upstream = "http://ollama:11434"
"#;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.inspection.timeout_seconds, 10);
        assert_eq!(config.inspection.on_failure, FailureMode::BadGateway);
        assert_eq!(config.confirm.status_code, ConfirmStatus::PreconditionRequired);
        assert!(config.auth.secret().is_none());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = GatewayConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.inspection.on_failure, FailureMode::Block);
        assert_eq!(config.confirm.status_code, ConfirmStatus::Conflict);
        assert_eq!(config.routes.len(), 2);

        let table = config.policy_table().unwrap();
        let strict = table.get("strict").unwrap();
        assert_eq!(strict.default_action, PolicyAction::Block);
        assert_eq!(strict.confirm.ttl_seconds, 30);
        assert!(strict.type_overrides.contains_key("pii_email"));
    }

    #[test]
    fn test_rejects_unsupported_confirm_status() {
        let result = GatewayConfig::from_toml("[confirm]\nstatus_code = 418\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = GatewayConfig::from_toml("[inspection]\ntimeout_seconds = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_duplicate_route_ids() {
        let doc = r#"
[[routes]]
id = "a"
path_prefix = "/a"
upstream = "http://localhost:1"

[[routes]]
id = "A"
path_prefix = "/b"
upstream = "http://localhost:2"
"#;
        assert!(matches!(
            GatewayConfig::from_toml(doc),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_relative_path_prefix() {
        let doc = r#"
[[routes]]
id = "a"
path_prefix = "api"
upstream = "http://localhost:1"
"#;
        assert!(matches!(
            GatewayConfig::from_toml(doc),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_upstream_url() {
        let doc = r#"
[[routes]]
id = "a"
path_prefix = "/a"
upstream = "not a url"
"#;
        assert!(matches!(
            GatewayConfig::from_toml(doc),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_partial_severity_map_layers_over_defaults() {
        let doc = r#"
[policies.Lax]
severity_to_action = { high = "confirm" }
"#;
        let config = GatewayConfig::from_toml(doc).unwrap();
        let table = config.policy_table().unwrap();
        let lax = table.get("Lax").unwrap();

        let low = [aegis_core::Finding::new("pii_phone", "low")];
        let high = [aegis_core::Finding::new("secret_jwt", "high")];
        assert_eq!(aegis_core::evaluate(lax, &low), PolicyAction::Allow);
        assert_eq!(aegis_core::evaluate(lax, &high), PolicyAction::Confirm);
    }

    #[test]
    fn test_rejects_unbounded_confirm_ttl() {
        let doc = r#"
[policies.Default]
confirm = { ttl_seconds = 9999999999 }
"#;
        assert!(matches!(
            GatewayConfig::from_toml(doc),
            Err(ConfigError::Policy(_))
        ));
    }

    #[test]
    fn test_upstream_timeout_zero_disables() {
        let mut server = ServerConfig::default();
        assert_eq!(server.upstream_timeout(), Some(Duration::from_secs(300)));
        server.upstream_timeout_seconds = 0;
        assert_eq!(server.upstream_timeout(), None);
    }
}
