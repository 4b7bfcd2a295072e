//! Delegation decision records.
//!
//! The decision activity returns a typed `DelegationDecision`; the workflow
//! appends a `DecisionRecord` (decision + provenance) to its status frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the deciding agent chose to do with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationAction {
    /// Execute the task itself.
    Handle,
    /// Hand the whole task to one teammate.
    Delegate,
    /// Split into subtasks executed concurrently by multiple teammates.
    Parallel,
    /// Block and ask the user for missing information.
    AskClarification,
}

impl DelegationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handle => "handle",
            Self::Delegate => "delegate",
            Self::Parallel => "parallel",
            Self::AskClarification => "ask_clarification",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "handle" => Some(Self::Handle),
            "delegate" => Some(Self::Delegate),
            "parallel" => Some(Self::Parallel),
            "ask_clarification" | "clarify" => Some(Self::AskClarification),
            _ => None,
        }
    }
}

/// One slice of a parallel split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub description: String,
    /// Agent type chosen for this slice. Falls back to the deciding agent.
    #[serde(default)]
    pub assigned_to: Option<String>,
}

/// How the decision was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    /// Structured response from the agent via the gateway.
    Gateway,
    /// Local fallback after parse/validation retries were exhausted.
    Fallback,
}

impl DecisionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Fallback => "fallback",
        }
    }
}

/// The typed record returned by the decide activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationDecision {
    pub action: DelegationAction,
    #[serde(default)]
    pub delegated_to: Option<String>,
    #[serde(default)]
    pub subtasks: Option<Vec<SubtaskSpec>>,
    pub reason: String,
    pub confidence: f64,
    pub method: DecisionMethod,
}

impl DelegationDecision {
    /// The local fallback when the agent's response never validated.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            action: DelegationAction::Handle,
            delegated_to: None,
            subtasks: None,
            reason: reason.into(),
            confidence: 0.3,
            method: DecisionMethod::Fallback,
        }
    }

    /// Clamp confidence into [0, 1] after deserialization.
    pub fn normalized(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// A decision with provenance, appended to the delegation status frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub agent: String,
    pub action: DelegationAction,
    pub confidence: f64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_handle_with_low_confidence() {
        let d = DelegationDecision::fallback("fallback");
        assert_eq!(d.action, DelegationAction::Handle);
        assert!((d.confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(d.method, DecisionMethod::Fallback);
    }

    #[test]
    fn normalized_clamps_confidence() {
        let d = DelegationDecision {
            action: DelegationAction::Delegate,
            delegated_to: Some("devops-manager".into()),
            subtasks: None,
            reason: "specialist".into(),
            confidence: 1.7,
            method: DecisionMethod::Gateway,
        }
        .normalized();
        assert!((d.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn action_parses_aliases() {
        assert_eq!(
            DelegationAction::from_str("ASK_CLARIFICATION"),
            Some(DelegationAction::AskClarification)
        );
        assert_eq!(DelegationAction::from_str("nonsense"), None);
    }
}
