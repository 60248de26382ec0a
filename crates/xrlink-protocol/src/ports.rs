//! Host boundary ports.
//!
//! These traits are the only way the bridge talks to the host XR
//! implementation and the graphics context. Handles returned through them are
//! snapshots: device lists are owned and mutated by the host, so nothing here
//! is assumed stable across frames.
//!
//! Object-safety note:
//! - Asynchronous host operations use `async-trait` for dyn dispatch.
//! - Frames are handed out as `Arc<dyn XrFrame>` and only queried while the
//!   animation frame callback that received them is running.

use crate::error::HostResult;
use crate::hand::HandJoint;
use crate::ids::{FrameRequestId, FramebufferId, HandId, ListenerId, SpaceId};
use crate::input::InputSource;
use crate::mode::{ReferenceSpaceType, SessionInit, SessionMode};
use crate::pose::{JointPose, Pose, ReferenceSpace, View, ViewerPose, Viewport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One-shot callback fired by the host when the requested frame is ready.
pub type AnimationFrameCallback = Box<dyn FnOnce(f64, Arc<dyn XrFrame>) + Send>;

/// Session event listener. The host passes itself so listeners can inspect
/// the live input source list without holding a reference to the session.
pub type SessionEventListener = Arc<dyn Fn(&dyn XrSessionPort, &SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventKind {
    Select,
    SelectStart,
    SelectEnd,
    Blur,
    Focus,
    End,
}

impl SessionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::SelectStart => "selectstart",
            Self::SelectEnd => "selectend",
            Self::Blur => "blur",
            Self::Focus => "focus",
            Self::End => "end",
        }
    }

    /// Input events carry an originating input source.
    pub fn is_input(self) -> bool {
        matches!(self, Self::Select | Self::SelectStart | Self::SelectEnd)
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub input_source: Option<InputSource>,
}

impl SessionEvent {
    pub fn session(kind: SessionEventKind) -> Self {
        Self {
            kind,
            input_source: None,
        }
    }

    pub fn input(kind: SessionEventKind, source: InputSource) -> Self {
        Self {
            kind,
            input_source: Some(source),
        }
    }
}

/// Entry point of the host XR implementation.
#[async_trait]
pub trait XrSystemPort: Send + Sync {
    async fn is_session_supported(&self, mode: SessionMode) -> HostResult<bool>;
    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> HostResult<Arc<dyn XrSessionPort>>;
}

/// A granted XR session.
#[async_trait]
pub trait XrSessionPort: Send + Sync {
    fn mode(&self) -> SessionMode;
    fn input_sources(&self) -> Vec<InputSource>;
    fn add_event_listener(
        &self,
        kind: SessionEventKind,
        listener: SessionEventListener,
    ) -> ListenerId;
    fn remove_event_listener(&self, id: ListenerId);
    fn request_animation_frame(&self, callback: AnimationFrameCallback) -> FrameRequestId;
    fn cancel_animation_frame(&self, id: FrameRequestId);
    async fn request_reference_space(&self, kind: ReferenceSpaceType)
    -> HostResult<ReferenceSpace>;
    /// Creates the render layer for `graphics` and makes it the session's base layer.
    fn attach_base_layer(&self, graphics: &dyn GraphicsContextPort) -> HostResult<()>;
    /// Render target of the base layer, once attached.
    fn framebuffer(&self) -> Option<FramebufferId>;
    fn viewport(&self, view: &View) -> Option<Viewport>;
    fn set_depth_range(&self, near: f32, far: f32);
    /// Asks the host to end the session. The host answers with an `End` event.
    fn end(&self);
}

/// Pose queries valid only during one animation frame callback.
pub trait XrFrame: Send + Sync {
    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose>;
    fn pose(&self, space: SpaceId, base: &ReferenceSpace) -> Option<Pose>;
    fn joint_pose(
        &self,
        hand: HandId,
        joint: HandJoint,
        base: &ReferenceSpace,
    ) -> HostResult<Option<JointPose>>;
}

/// The graphics context the native renderer draws with.
#[async_trait]
pub trait GraphicsContextPort: Send + Sync {
    async fn make_xr_compatible(&self) -> HostResult<()>;
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);
    fn clear_depth(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_host_strings() {
        assert_eq!(SessionEventKind::SelectStart.to_string(), "selectstart");
        assert_eq!(SessionEventKind::SelectEnd.as_str(), "selectend");
        assert!(SessionEventKind::Select.is_input());
        assert!(!SessionEventKind::Blur.is_input());
        assert!(!SessionEventKind::End.is_input());
    }
}
