//! Serving-status state machine.
//!
//! # States
//! - UNKNOWN: registered (or never seen), not yet serving
//! - SERVING: listener bound and accept loop running
//! - NOT_SERVING: graceful shutdown has started
//!
//! # State Transitions
//! ```text
//! UNKNOWN → SERVING → NOT_SERVING
//! UNKNOWN → NOT_SERVING            (shutdown before serving)
//! ```
//! NOT_SERVING is terminal for the lifetime of the process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rpc::{Code, RpcStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    #[default]
    Unknown,
    NotServing,
    Serving,
}

impl ServingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::NotServing => "NOT_SERVING",
            ServingStatus::Serving => "SERVING",
        }
    }

    /// Gauge value exported as `service_health_status`.
    pub fn as_metric(self) -> f64 {
        match self {
            ServingStatus::Unknown => 0.0,
            ServingStatus::NotServing => 1.0,
            ServingStatus::Serving => 2.0,
        }
    }

    /// Whether moving from `self` to `next` is allowed. Staying put is.
    pub fn can_transition_to(self, next: ServingStatus) -> bool {
        use ServingStatus::*;
        matches!(
            (self, next),
            (Unknown, _) | (Serving, Serving) | (Serving, NotServing) | (NotServing, NotServing)
        )
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealthError {
    /// Push-based status streams are not provided; poll `Check` instead.
    #[error("health watch is not supported, poll Check instead")]
    Unsupported,

    #[error("service `{service}` cannot move from {from} to {to}")]
    InvalidTransition {
        service: String,
        from: ServingStatus,
        to: ServingStatus,
    },
}

impl From<HealthError> for RpcStatus {
    fn from(err: HealthError) -> Self {
        let code = match err {
            HealthError::Unsupported => Code::Unimplemented,
            HealthError::InvalidTransition { .. } => Code::FailedPrecondition,
        };
        RpcStatus::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServingStatus::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(Unknown.can_transition_to(Serving));
        assert!(Unknown.can_transition_to(NotServing));
        assert!(Serving.can_transition_to(NotServing));
        assert!(Serving.can_transition_to(Serving));
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(!NotServing.can_transition_to(Serving));
        assert!(!NotServing.can_transition_to(Unknown));
        assert!(!Serving.can_transition_to(Unknown));
    }

    #[test]
    fn serializes_as_wire_names() {
        assert_eq!(serde_json::to_string(&NotServing).unwrap(), "\"NOT_SERVING\"");
        let parsed: ServingStatus = serde_json::from_str("\"SERVING\"").unwrap();
        assert_eq!(parsed, Serving);
    }

    #[test]
    fn unsupported_maps_to_unimplemented() {
        let status = RpcStatus::from(HealthError::Unsupported);
        assert_eq!(status.code, Code::Unimplemented);
    }
}
