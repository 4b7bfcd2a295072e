//! Outbound leakage detection.
//!
//! Stateless scanner over agent output text. Any UUID that is not the
//! current tenant's id is treated as potential cross-customer leakage;
//! key/token shapes are secrets; email, phone, and SSN shapes are PII.
//! High and critical alerts cause the invocation client to redact the
//! payload before it leaves the process.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Severity of a leakage finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this severity forces redaction of the outgoing payload.
    pub fn blocks_response(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Kind of leakage found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Pii,
    CrossCustomer,
    Secret,
}

/// One leakage finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageAlert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Replacement payload for blocked responses.
pub const REDACTED_PLACEHOLDER: &str =
    "[SECURITY REDACTED] - Potential data leakage detected.";

struct Patterns {
    email: Regex,
    phone: Regex,
    ssn: Regex,
    uuid: Regex,
    api_key: Regex,
    jwt: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),
        phone: Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap(),
        ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        uuid: Regex::new(
            r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
        )
        .unwrap(),
        api_key: Regex::new(r"sk-[a-zA-Z0-9]{32,}").unwrap(),
        jwt: Regex::new(r"eyJ[a-zA-Z0-9_-]{10,}\.eyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}")
            .unwrap(),
    })
}

/// Stateless content scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeakageDetector;

impl LeakageDetector {
    pub fn new() -> Self {
        Self
    }

    /// Scan content for leakage relative to the current tenant.
    pub fn scan(&self, content: &str, customer_id: Uuid) -> Vec<LeakageAlert> {
        let p = patterns();
        let mut alerts = Vec::new();
        let now = Utc::now();

        if p.email.is_match(content) || p.phone.is_match(content) || p.ssn.is_match(content) {
            alerts.push(LeakageAlert {
                severity: AlertSeverity::Medium,
                kind: AlertKind::Pii,
                description: "Potential PII detected in output".to_string(),
                timestamp: now,
            });
        }

        if p.api_key.is_match(content) || p.jwt.is_match(content) {
            alerts.push(LeakageAlert {
                severity: AlertSeverity::Critical,
                kind: AlertKind::Secret,
                description: "Potential API key or token detected".to_string(),
                timestamp: now,
            });
        }

        let own_id = customer_id.to_string().to_lowercase();
        let lowered = content.to_lowercase();
        let foreign: Vec<&str> = p
            .uuid
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|found| *found != own_id)
            .collect();
        if !foreign.is_empty() {
            alerts.push(LeakageAlert {
                severity: AlertSeverity::High,
                kind: AlertKind::CrossCustomer,
                description: format!(
                    "Potential cross-customer leakage: Found {} foreign UUIDs",
                    foreign.len()
                ),
                timestamp: now,
            });
        }

        for alert in &alerts {
            tracing::warn!(
                severity = alert.severity.as_str(),
                customer_id = %customer_id,
                "SECURITY ALERT: {}",
                alert.description
            );
        }

        alerts
    }

    /// Whether any alert in the set forces redaction.
    pub fn should_block(alerts: &[LeakageAlert]) -> bool {
        alerts.iter().any(|a| a.severity.blocks_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_yields_no_alerts() {
        let alerts = LeakageDetector::new().scan("Draft plan: three blog posts", Uuid::new_v4());
        assert!(alerts.is_empty());
    }

    #[test]
    fn own_uuid_is_not_flagged() {
        let customer = Uuid::new_v4();
        let content = format!("Your workspace id is {customer}");
        let alerts = LeakageDetector::new().scan(&content, customer);
        assert!(alerts.is_empty());
    }

    #[test]
    fn foreign_uuid_is_high_severity() {
        let customer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let content = format!("Revenue for {other} is $5,000,000");
        let alerts = LeakageDetector::new().scan(&content, customer);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CrossCustomer);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert!(LeakageDetector::should_block(&alerts));
    }

    #[test]
    fn api_key_is_critical() {
        let content = format!("use sk-{}", "a".repeat(40));
        let alerts = LeakageDetector::new().scan(&content, Uuid::new_v4());
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::Secret && a.severity == AlertSeverity::Critical));
    }

    #[test]
    fn jwt_is_critical() {
        let content = format!(
            "token eyJ{}.eyJ{}.{}",
            "a".repeat(12),
            "b".repeat(12),
            "c".repeat(12)
        );
        let alerts = LeakageDetector::new().scan(&content, Uuid::new_v4());
        assert!(alerts.iter().any(|a| a.kind == AlertKind::Secret));
    }

    #[test]
    fn email_is_medium_and_does_not_block_alone() {
        let alerts = LeakageDetector::new().scan("contact bob@example.com", Uuid::new_v4());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
        assert!(!LeakageDetector::should_block(&alerts));
    }
}
