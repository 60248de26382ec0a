//! Identifier types.
//!
//! [`SessionId`] is minted by the bridge for each granted session and only
//! appears in logs and lifecycle records. The numeric handles are opaque
//! tokens handed out by the host; the bridge compares them for identity and
//! never assumes they stay valid across frames.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new ID using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

macro_rules! host_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

typed_id!(
    /// Identifier for one granted XR session.
    SessionId
);

host_handle!(
    /// Host identity of an input source. Distinct from the positional index
    /// written into descriptors.
    InputSourceId
);
host_handle!(
    /// Host handle for the articulated hand attached to an input source.
    HandId
);
host_handle!(
    /// Host handle for a pose space (target ray, grip, reference space).
    SpaceId
);
host_handle!(
    /// Pending animation frame request.
    FrameRequestId
);
host_handle!(
    /// Registered session event listener.
    ListenerId
);
host_handle!(
    /// Render target associated with the session's base layer.
    FramebufferId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_new_is_unique() {
        let a = SessionId::new_uuid();
        let b = SessionId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_from_string() {
        let id = SessionId::from_string("s-1");
        assert_eq!(id.as_str(), "s-1");
        assert_eq!(id.to_string(), "s-1");
    }

    #[test]
    fn handles_serialize_transparently() {
        let json = serde_json::to_string(&InputSourceId(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(SpaceId(3).to_string(), "SpaceId#3");
    }
}
