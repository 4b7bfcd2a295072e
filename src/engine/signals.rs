//! Workflow signals and the workflow-local state they mutate.
//!
//! Signal handlers only touch this state; they never perform I/O. Recorded
//! signal events are re-applied before replay so a resumed workflow sees the
//! same state its first execution did.

use serde::{Deserialize, Serialize};

/// External signals accepted by delegation workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "payload", rename_all = "snake_case")]
pub enum Signal {
    PauseDelegation,
    ResumeDelegation,
    CancelDelegation,
    ApprovePlan,
    ProvideFeedback(String),
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PauseDelegation => "pause_delegation",
            Self::ResumeDelegation => "resume_delegation",
            Self::CancelDelegation => "cancel_delegation",
            Self::ApprovePlan => "approve_plan",
            Self::ProvideFeedback(_) => "provide_feedback",
        }
    }
}

/// Workflow-local signal state, observed through `wait_until` predicates.
///
/// `feedback_count` is monotonic so a workflow can consume feedback by
/// remembering the count it has already seen, without mutating shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    pub paused: bool,
    pub cancelled: bool,
    pub plan_approved: bool,
    pub feedback_count: u64,
    pub last_feedback: Option<String>,
}

impl SignalState {
    pub fn apply(&mut self, signal: &Signal) {
        match signal {
            Signal::PauseDelegation => self.paused = true,
            Signal::ResumeDelegation => self.paused = false,
            Signal::CancelDelegation => self.cancelled = true,
            Signal::ApprovePlan => self.plan_approved = true,
            Signal::ProvideFeedback(text) => {
                self.feedback_count += 1;
                self.last_feedback = Some(text.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_resume_toggle() {
        let mut state = SignalState::default();
        state.apply(&Signal::PauseDelegation);
        assert!(state.paused);
        state.apply(&Signal::ResumeDelegation);
        assert!(!state.paused);
    }

    #[test]
    fn feedback_is_monotonic() {
        let mut state = SignalState::default();
        state.apply(&Signal::ProvideFeedback("$10k".into()));
        state.apply(&Signal::ProvideFeedback("by Friday".into()));
        assert_eq!(state.feedback_count, 2);
        assert_eq!(state.last_feedback.as_deref(), Some("by Friday"));
    }

    #[test]
    fn signal_round_trips_through_json() {
        let signal = Signal::ProvideFeedback("$10k".into());
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["signal"], "provide_feedback");
        let back: Signal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }
}
