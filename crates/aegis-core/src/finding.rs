//! Findings reported by the inspection service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a finding, ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lenient parse: case-insensitive, surrounding whitespace ignored.
    /// Returns `None` for absent or unrecognized values.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| v.parse().ok())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected sensitive span inside a prompt.
///
/// Produced entirely by the inspection service and never mutated by the gateway.
/// `severity` is kept as the raw string because the service may send values the
/// gateway does not recognize; [`Finding::severity`] does the lenient parse.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "severity", default)]
    pub raw_severity: Option<String>,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl Finding {
    pub fn new(kind: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            raw_severity: Some(severity.into()),
            start: 0,
            end: 0,
            snippet: None,
            message: None,
            confidence: 0.0,
        }
    }

    pub fn with_span(mut self, start: i64, end: i64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Parsed severity, `None` when absent or unrecognized.
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(self.raw_severity.as_deref())
    }

    /// Response-safe view of this finding (no snippet).
    pub fn redacted(&self) -> RedactedFinding {
        RedactedFinding {
            kind: self.kind.clone(),
            severity: self.raw_severity.clone(),
            start: self.start,
            end: self.end,
            message: self.message.clone(),
            confidence: self.confidence,
        }
    }
}

// Snippets are sensitive, so Debug output (and therefore `?finding` in logs) omits them.
impl fmt::Debug for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finding")
            .field("kind", &self.kind)
            .field("severity", &self.raw_severity)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("snippet", &self.snippet.as_ref().map(|_| "<redacted>"))
            .field("message", &self.message)
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// A finding projected for response bodies: type, severity, offsets and message only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedFinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Option<String>,
    pub start: i64,
    pub end: i64,
    pub message: Option<String>,
    pub confidence: f64,
}

/// Project a finding list for a response body.
pub fn redact_all(findings: &[Finding]) -> Vec<RedactedFinding> {
    findings.iter().map(Finding::redacted).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse(Some("HIGH")), Some(Severity::High));
        assert_eq!(Severity::parse(Some(" Medium ")), Some(Severity::Medium));
        assert_eq!(Severity::parse(Some("low")), Some(Severity::Low));
    }

    #[test]
    fn test_severity_parse_rejects_unknown() {
        assert_eq!(Severity::parse(None), None);
        assert_eq!(Severity::parse(Some("")), None);
        assert_eq!(Severity::parse(Some("critical")), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_finding_deserializes_service_contract() {
        let json = r#"{
            "type": "pii_email",
            "severity": "Medium",
            "start": 6,
            "end": 22,
            "snippet": "bob@example.com",
            "message": "Email address",
            "confidence": 0.93
        }"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(finding.kind, "pii_email");
        assert_eq!(finding.severity(), Some(Severity::Medium));
        assert_eq!(finding.start, 6);
        assert_eq!(finding.end, 22);
        assert_eq!(finding.snippet.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_finding_tolerates_missing_optional_fields() {
        let finding: Finding = serde_json::from_str(r#"{"type":"secret_jwt"}"#).unwrap();
        assert_eq!(finding.severity(), None);
        assert!(finding.snippet.is_none());
        assert!(finding.message.is_none());
    }

    #[test]
    fn test_redacted_finding_drops_snippet() {
        let finding = Finding::new("secret_jwt", "high")
            .with_span(3, 40)
            .with_snippet("eyJhbGciOi...")
            .with_message("JWT detected");

        let json = serde_json::to_value(finding.redacted()).unwrap();
        assert_eq!(json["type"], "secret_jwt");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["start"], 3);
        assert_eq!(json["end"], 40);
        assert_eq!(json["message"], "JWT detected");
        assert!(json.get("snippet").is_none());
    }

    #[test]
    fn test_debug_output_hides_snippet() {
        let finding = Finding::new("pii_email", "low").with_snippet("alice@example.com");
        let debug = format!("{finding:?}");
        assert!(!debug.contains("alice@example.com"));
        assert!(debug.contains("<redacted>"));
    }
}
