//! Lifecycle transition records.

use crate::ids::SessionId;
use crate::mode::{LifecycleState, SessionMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state change of the session lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Error code reported alongside the transition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    pub at: DateTime<Utc>,
}

impl LifecycleTransition {
    pub fn new(
        from: LifecycleState,
        to: LifecycleState,
        mode: SessionMode,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            from,
            to,
            mode,
            session_id,
            error_code: None,
            at: Utc::now(),
        }
    }

    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = Some(code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_serde_roundtrip() {
        let transition = LifecycleTransition::new(
            LifecycleState::SessionRequesting,
            LifecycleState::SessionActive,
            SessionMode::ImmersiveVr,
            Some(SessionId::from_string("S1")),
        );
        let json = serde_json::to_string(&transition).unwrap();
        assert!(json.contains("\"to\":\"session_active\""));
        assert!(!json.contains("error_code"));
        let back: LifecycleTransition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, transition);
    }

    #[test]
    fn error_code_is_attached() {
        let transition = LifecycleTransition::new(
            LifecycleState::CapabilityChecking,
            LifecycleState::Unsupported,
            SessionMode::ImmersiveAr,
            None,
        )
        .with_error_code(-2);
        assert_eq!(transition.error_code, Some(-2));
    }
}
