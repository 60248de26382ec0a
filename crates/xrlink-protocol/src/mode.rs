//! Session modes, session features and lifecycle states.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// XR session mode. Raw values are part of the native ABI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    Inline,
    #[default]
    ImmersiveVr,
    ImmersiveAr,
}

impl SessionMode {
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Inline => 0,
            Self::ImmersiveVr => 1,
            Self::ImmersiveAr => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::ImmersiveVr => "immersive-vr",
            Self::ImmersiveAr => "immersive-ar",
        }
    }

    /// Optional features requested on the first session attempt.
    pub fn optional_features(self) -> Vec<SessionFeature> {
        let mut features = vec![SessionFeature::HandTracking];
        if self == Self::ImmersiveAr {
            features.push(SessionFeature::HitTest);
            features.push(SessionFeature::PlaneDetection);
        }
        features
    }
}

impl TryFrom<i32> for SessionMode {
    type Error = BridgeError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Inline),
            1 => Ok(Self::ImmersiveVr),
            2 => Ok(Self::ImmersiveAr),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown session mode {other}"
            ))),
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session capabilities negotiated at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionFeature {
    HandTracking,
    HitTest,
    PlaneDetection,
}

impl SessionFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandTracking => "hand-tracking",
            Self::HitTest => "hit-test",
            Self::PlaneDetection => "plane-detection",
        }
    }
}

/// Feature sets passed with a session request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    #[serde(default)]
    pub required: Vec<SessionFeature>,
    #[serde(default)]
    pub optional: Vec<SessionFeature>,
}

impl SessionInit {
    pub fn for_mode(mode: SessionMode) -> Self {
        Self {
            required: Vec::new(),
            optional: mode.optional_features(),
        }
    }

    /// The degraded request used after the first attempt is rejected.
    pub fn required_only(&self) -> Self {
        Self {
            required: self.required.clone(),
            optional: Vec::new(),
        }
    }

    pub fn requests(&self, feature: SessionFeature) -> bool {
        self.required.contains(&feature) || self.optional.contains(&feature)
    }
}

/// Coordinate system requested once the session is granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceSpaceType {
    Viewer,
    #[default]
    Local,
    LocalFloor,
    BoundedFloor,
    Unbounded,
}

/// Session lifecycle controller states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    CapabilityChecking,
    /// Terminal: the platform or mode cannot host a session.
    Unsupported,
    /// Capability confirmed; waiting for the application to request a session.
    CapabilityConfirmed,
    SessionRequesting,
    SessionActive,
    SessionEnding,
    /// Terminal for this initialisation.
    Ended,
}

impl LifecycleState {
    /// States in which `init` may (re)start the controller. `Unsupported`
    /// is not one of them.
    pub fn accepts_init(self) -> bool {
        matches!(self, Self::Uninitialized | Self::CapabilityConfirmed | Self::Ended)
    }

    pub fn has_session(self) -> bool {
        matches!(self, Self::SessionActive | Self::SessionEnding)
    }
}
