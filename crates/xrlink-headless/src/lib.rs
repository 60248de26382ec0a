//! Scriptable in-process XR host.
//!
//! Implements every xrlink host port without a device: session support,
//! feature negotiation, animation frames, input sources, hand skeletons and a
//! recording graphics context are all driven from a [`HeadlessScript`] and the
//! helper methods on [`HeadlessSession`]. Frame delivery is explicit: nothing
//! happens until the caller invokes [`HeadlessSession::tick`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use xrlink_protocol::{
    AnimationFrameCallback, Eye, FrameRequestId, FramebufferId, GraphicsContextPort, HandId,
    HandJoint, Handedness, HostError, HostResult, InputSource, InputSourceId, JointPose,
    ListenerId, Pose, ReferenceSpace, ReferenceSpaceType, RigidTransform, SessionEvent,
    SessionEventKind, SessionEventListener, SessionFeature, SessionInit, SessionMode, SpaceId,
    TargetRayMode, View, ViewerPose, Viewport, XrFrame, XrSessionPort, XrSystemPort,
};

/// Host behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessScript {
    pub supported_modes: Vec<SessionMode>,
    /// The capability query itself fails.
    pub fail_support_query: bool,
    /// Requests that ask for optional features are rejected.
    pub reject_optional_features: bool,
    /// Every session request is rejected.
    pub reject_sessions: bool,
    pub fail_reference_space: bool,
    pub render_width: i32,
    pub render_height: i32,
}

impl Default for HeadlessScript {
    fn default() -> Self {
        Self {
            supported_modes: vec![
                SessionMode::Inline,
                SessionMode::ImmersiveVr,
                SessionMode::ImmersiveAr,
            ],
            fail_support_query: false,
            reject_optional_features: false,
            reject_sessions: false,
            fail_reference_space: false,
            render_width: 2064,
            render_height: 2208,
        }
    }
}

#[derive(Default)]
pub struct HeadlessSystem {
    script: Mutex<HeadlessScript>,
    requests: Mutex<Vec<(SessionMode, SessionInit)>>,
    sessions: Mutex<Vec<Arc<HeadlessSession>>>,
}

impl HeadlessSystem {
    pub fn new(script: HeadlessScript) -> Self {
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    pub fn update_script(&self, update: impl FnOnce(&mut HeadlessScript)) {
        update(&mut self.script.lock());
    }

    /// Every session request received, in order.
    pub fn requests(&self) -> Vec<(SessionMode, SessionInit)> {
        self.requests.lock().clone()
    }

    /// The most recently granted session.
    pub fn last_session(&self) -> Option<Arc<HeadlessSession>> {
        self.sessions.lock().last().cloned()
    }

    pub fn granted_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl XrSystemPort for HeadlessSystem {
    async fn is_session_supported(&self, mode: SessionMode) -> HostResult<bool> {
        let script = self.script.lock();
        if script.fail_support_query {
            return Err(HostError::Rejected("support query failed".to_owned()));
        }
        Ok(script.supported_modes.contains(&mode))
    }

    #[instrument(skip(self, init), fields(mode = %mode, optional = init.optional.len()))]
    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> HostResult<Arc<dyn XrSessionPort>> {
        self.requests.lock().push((mode, init.clone()));
        let script = self.script.lock().clone();
        if script.reject_sessions {
            return Err(HostError::Rejected("session request denied".to_owned()));
        }
        if script.reject_optional_features && !init.optional.is_empty() {
            return Err(HostError::NotSupported(format!(
                "optional features {:?}",
                init.optional
            )));
        }
        if !script.supported_modes.contains(&mode) {
            return Err(HostError::NotSupported(mode.to_string()));
        }

        let mut features = init.required.clone();
        features.extend(init.optional.iter().copied());
        let session = Arc::new(HeadlessSession::new(mode, features, &script));
        self.sessions.lock().push(session.clone());
        debug!("headless session granted");
        Ok(session)
    }
}

struct Tracking {
    viewer: Option<ViewerPose>,
    spaces: HashMap<SpaceId, Pose>,
    hands: HashMap<HandId, [f32; 3]>,
    failing_joints: HashSet<(HandId, HandJoint)>,
    missing_joints: HashSet<(HandId, HandJoint)>,
}

struct SessionState {
    next_handle: u64,
    input_sources: Vec<InputSource>,
    listeners: Vec<(ListenerId, SessionEventKind, SessionEventListener)>,
    pending_frame: Option<(FrameRequestId, AnimationFrameCallback)>,
    cancelled: Vec<FrameRequestId>,
    ended: bool,
    base_layer: Option<FramebufferId>,
    depth_range: (f32, f32),
    tracking: Tracking,
    frames: u64,
}

impl SessionState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct HeadlessSession {
    mode: SessionMode,
    features: Vec<SessionFeature>,
    fail_reference_space: bool,
    render_size: (i32, i32),
    state: Mutex<SessionState>,
}

impl HeadlessSession {
    fn new(mode: SessionMode, features: Vec<SessionFeature>, script: &HeadlessScript) -> Self {
        Self {
            mode,
            features,
            fail_reference_space: script.fail_reference_space,
            render_size: (script.render_width, script.render_height),
            state: Mutex::new(SessionState {
                next_handle: 100,
                input_sources: Vec::new(),
                listeners: Vec::new(),
                pending_frame: None,
                cancelled: Vec::new(),
                ended: false,
                base_layer: None,
                depth_range: (0.1, 1000.0),
                tracking: Tracking {
                    viewer: Some(stereo_viewer_pose([0.0, 1.6, 0.0])),
                    spaces: HashMap::new(),
                    hands: HashMap::new(),
                    failing_joints: HashSet::new(),
                    missing_joints: HashSet::new(),
                },
                frames: 0,
            }),
        }
    }

    pub fn granted_features(&self) -> &[SessionFeature] {
        &self.features
    }

    /// Adds a tracked-pointer controller with target-ray and grip spaces.
    pub fn add_controller(&self, handedness: Handedness) -> InputSource {
        let mut state = self.state.lock();
        let id = InputSourceId(state.next_handle());
        let target_ray_space = SpaceId(state.next_handle());
        let grip_space = SpaceId(state.next_handle());
        let x = match handedness {
            Handedness::Left => -0.2,
            Handedness::Right => 0.2,
            Handedness::Unknown => 0.0,
        };
        state.tracking.spaces.insert(
            target_ray_space,
            Pose {
                transform: RigidTransform::from_position_orientation(
                    [x, 1.2, -0.3],
                    [0.0, 0.0, 0.0, 1.0],
                ),
                emulated_position: false,
            },
        );
        state.tracking.spaces.insert(
            grip_space,
            Pose {
                transform: RigidTransform::from_position_orientation(
                    [x, 1.15, -0.25],
                    [0.0, 0.0, 0.0, 1.0],
                ),
                emulated_position: false,
            },
        );
        let source = InputSource {
            id,
            handedness,
            target_ray_mode: TargetRayMode::TrackedPointer,
            hand: None,
            has_gamepad: true,
            target_ray_space: Some(target_ray_space),
            grip_space: Some(grip_space),
        };
        state.input_sources.push(source.clone());
        source
    }

    /// Adds an articulated hand. Its target ray is tracked, it has no grip space.
    pub fn add_hand(&self, handedness: Handedness) -> InputSource {
        let mut state = self.state.lock();
        let id = InputSourceId(state.next_handle());
        let hand = HandId(state.next_handle());
        let target_ray_space = SpaceId(state.next_handle());
        let x = match handedness {
            Handedness::Left => -0.15,
            Handedness::Right => 0.15,
            Handedness::Unknown => 0.0,
        };
        state.tracking.hands.insert(hand, [x, 1.1, -0.35]);
        state.tracking.spaces.insert(
            target_ray_space,
            Pose {
                transform: RigidTransform::from_position_orientation(
                    [x, 1.1, -0.35],
                    [0.0, 0.0, 0.0, 1.0],
                ),
                emulated_position: true,
            },
        );
        let source = InputSource {
            id,
            handedness,
            target_ray_mode: TargetRayMode::TrackedPointer,
            hand: Some(hand),
            has_gamepad: false,
            target_ray_space: Some(target_ray_space),
            grip_space: None,
        };
        state.input_sources.push(source.clone());
        source
    }

    pub fn add_input_source(&self, source: InputSource) {
        self.state.lock().input_sources.push(source);
    }

    pub fn remove_input_source(&self, id: InputSourceId) {
        self.state
            .lock()
            .input_sources
            .retain(|source| source.id != id);
    }

    /// `None` simulates tracking loss.
    pub fn set_viewer_pose(&self, pose: Option<ViewerPose>) {
        self.state.lock().tracking.viewer = pose;
    }

    pub fn set_space_pose(&self, space: SpaceId, pose: Option<Pose>) {
        let mut state = self.state.lock();
        match pose {
            Some(pose) => {
                state.tracking.spaces.insert(space, pose);
            }
            None => {
                state.tracking.spaces.remove(&space);
            }
        }
    }

    /// Resolving `joint` will raise a host error.
    pub fn fail_joint(&self, hand: HandId, joint: HandJoint) {
        self.state
            .lock()
            .tracking
            .failing_joints
            .insert((hand, joint));
    }

    /// Resolving `joint` will report no pose.
    pub fn hide_joint(&self, hand: HandId, joint: HandJoint) {
        self.state
            .lock()
            .tracking
            .missing_joints
            .insert((hand, joint));
    }

    /// Delivers the pending animation frame, if any. Returns whether a frame
    /// callback ran.
    pub fn tick(&self, time: f64) -> bool {
        let Some(callback) = self.take_pending_frame() else {
            return false;
        };
        let frame = Arc::new(self.snapshot_frame());
        callback(time, frame.clone());
        frame.invalidate();
        true
    }

    /// Removes the pending frame callback without running it, so a caller can
    /// deliver it late.
    pub fn take_pending_frame(&self) -> Option<AnimationFrameCallback> {
        let mut state = self.state.lock();
        if state.ended {
            return None;
        }
        let (id, callback) = state.pending_frame.take()?;
        state.frames += 1;
        debug!(request = %id, frame = state.frames, "delivering animation frame");
        Some(callback)
    }

    /// A frame snapshot of the current tracking state.
    pub fn snapshot_frame(&self) -> HeadlessFrame {
        let state = self.state.lock();
        HeadlessFrame {
            viewer: state.tracking.viewer.clone(),
            spaces: state.tracking.spaces.clone(),
            hands: state.tracking.hands.clone(),
            failing_joints: state.tracking.failing_joints.clone(),
            missing_joints: state.tracking.missing_joints.clone(),
            active: AtomicBool::new(true),
        }
    }

    /// Fires an input event for `source`, which need not be in the live list.
    pub fn fire_input(&self, kind: SessionEventKind, source: InputSource) {
        self.fire(SessionEvent::input(kind, source));
    }

    pub fn fire_session_event(&self, kind: SessionEventKind) {
        self.fire(SessionEvent::session(kind));
    }

    /// Host-initiated termination, e.g. the user took off the headset.
    pub fn end_from_host(&self) {
        self.end();
    }

    fn fire(&self, event: SessionEvent) {
        let listeners: Vec<SessionEventListener> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(self, &event);
        }
    }

    pub fn listener_count(&self, kind: SessionEventKind) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == kind)
            .count()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// A scheduled frame stays pending after `end` until its requester
    /// cancels it; `tick` never delivers it either way.
    pub fn has_pending_frame(&self) -> bool {
        self.state.lock().pending_frame.is_some()
    }

    pub fn pending_request(&self) -> Option<FrameRequestId> {
        self.state.lock().pending_frame.as_ref().map(|(id, _)| *id)
    }

    pub fn cancelled_requests(&self) -> Vec<FrameRequestId> {
        self.state.lock().cancelled.clone()
    }

    pub fn depth_range(&self) -> (f32, f32) {
        self.state.lock().depth_range
    }

    pub fn frames_delivered(&self) -> u64 {
        self.state.lock().frames
    }
}

#[async_trait]
impl XrSessionPort for HeadlessSession {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    fn input_sources(&self) -> Vec<InputSource> {
        self.state.lock().input_sources.clone()
    }

    fn add_event_listener(
        &self,
        kind: SessionEventKind,
        listener: SessionEventListener,
    ) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_handle());
        state.listeners.push((id, kind, listener));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.state
            .lock()
            .listeners
            .retain(|(registered, _, _)| *registered != id);
    }

    fn request_animation_frame(&self, callback: AnimationFrameCallback) -> FrameRequestId {
        let mut state = self.state.lock();
        let id = FrameRequestId(state.next_handle());
        if !state.ended {
            state.pending_frame = Some((id, callback));
        }
        id
    }

    fn cancel_animation_frame(&self, id: FrameRequestId) {
        let mut state = self.state.lock();
        if state
            .pending_frame
            .as_ref()
            .is_some_and(|(pending, _)| *pending == id)
        {
            state.pending_frame = None;
        }
        state.cancelled.push(id);
    }

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceType,
    ) -> HostResult<ReferenceSpace> {
        if self.fail_reference_space {
            return Err(HostError::NotSupported(format!("{kind:?} reference space")));
        }
        let id = SpaceId(self.state.lock().next_handle());
        Ok(ReferenceSpace { id, kind })
    }

    fn attach_base_layer(&self, _graphics: &dyn GraphicsContextPort) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(HostError::InvalidState("session already ended".to_owned()));
        }
        let id = FramebufferId(state.next_handle());
        state.base_layer = Some(id);
        Ok(())
    }

    fn framebuffer(&self) -> Option<FramebufferId> {
        self.state.lock().base_layer
    }

    fn viewport(&self, view: &View) -> Option<Viewport> {
        self.state.lock().base_layer?;
        let (width, height) = self.render_size;
        let half = width / 2;
        Some(match view.eye {
            Eye::Left => Viewport {
                x: 0,
                y: 0,
                width: half,
                height,
            },
            Eye::Right => Viewport {
                x: half,
                y: 0,
                width: half,
                height,
            },
            Eye::None => Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
        })
    }

    fn set_depth_range(&self, near: f32, far: f32) {
        self.state.lock().depth_range = (near, far);
    }

    fn end(&self) {
        {
            let mut state = self.state.lock();
            if state.ended {
                return;
            }
            state.ended = true;
        }
        debug!("headless session ended");
        self.fire(SessionEvent::session(SessionEventKind::End));
    }
}

/// Frame snapshot; queries fail once the frame callback has returned.
pub struct HeadlessFrame {
    viewer: Option<ViewerPose>,
    spaces: HashMap<SpaceId, Pose>,
    hands: HashMap<HandId, [f32; 3]>,
    failing_joints: HashSet<(HandId, HandJoint)>,
    missing_joints: HashSet<(HandId, HandJoint)>,
    active: AtomicBool,
}

impl HeadlessFrame {
    pub fn invalidate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl XrFrame for HeadlessFrame {
    fn viewer_pose(&self, _space: &ReferenceSpace) -> Option<ViewerPose> {
        if !self.is_active() {
            return None;
        }
        self.viewer.clone()
    }

    fn pose(&self, space: SpaceId, _base: &ReferenceSpace) -> Option<Pose> {
        if !self.is_active() {
            return None;
        }
        self.spaces.get(&space).copied()
    }

    fn joint_pose(
        &self,
        hand: HandId,
        joint: HandJoint,
        _base: &ReferenceSpace,
    ) -> HostResult<Option<JointPose>> {
        if !self.is_active() {
            return Err(HostError::InvalidState("frame is no longer active".to_owned()));
        }
        if self.failing_joints.contains(&(hand, joint)) {
            return Err(HostError::InvalidState(format!(
                "joint space {} unavailable",
                joint.name()
            )));
        }
        if self.missing_joints.contains(&(hand, joint)) {
            return Ok(None);
        }
        Ok(self
            .hands
            .get(&hand)
            .map(|origin| skeleton_joint(*origin, joint)))
    }
}

/// Deterministic skeleton: joints fan out from the wrist along +y.
fn skeleton_joint(origin: [f32; 3], joint: HandJoint) -> JointPose {
    let index = joint.index() as f32;
    let position = [origin[0], origin[1] + 0.008 * index, origin[2] - 0.002 * index];
    JointPose {
        transform: RigidTransform::from_position_orientation(position, [0.0, 0.0, 0.0, 1.0]),
        radius: match joint {
            HandJoint::Wrist => None,
            _ => Some(0.006),
        },
    }
}

/// Stereo pose with eyes 64 mm apart around `head`.
pub fn stereo_viewer_pose(head: [f32; 3]) -> ViewerPose {
    let eye = |eye: Eye, dx: f32| View {
        eye,
        transform: RigidTransform::from_position_orientation(
            [head[0] + dx, head[1], head[2]],
            [0.0, 0.0, 0.0, 1.0],
        ),
        projection_matrix: perspective(1.4, 1.0, 0.1, 1000.0),
    };
    ViewerPose {
        transform: RigidTransform::from_position_orientation(head, [0.0, 0.0, 0.0, 1.0]),
        views: vec![eye(Eye::Left, -0.032), eye(Eye::Right, 0.032)],
        emulated_position: false,
    }
}

/// Column-major perspective projection.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let f = 1.0 / (fov_y / 2.0).tan();
    let range = 1.0 / (near - far);
    let mut m = [0.0; 16];
    m[0] = f / aspect;
    m[5] = f;
    m[10] = (far + near) * range;
    m[11] = -1.0;
    m[14] = 2.0 * far * near * range;
    m
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsCall {
    MakeXrCompatible,
    BindFramebuffer(Option<FramebufferId>),
    ClearDepth,
}

/// Graphics context that records every call.
pub struct HeadlessGraphics {
    compatible: bool,
    calls: Mutex<Vec<GraphicsCall>>,
}

impl HeadlessGraphics {
    pub fn new() -> Self {
        Self {
            compatible: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A context that refuses to become XR compatible.
    pub fn incompatible() -> Self {
        Self {
            compatible: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<GraphicsCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: GraphicsCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }
}

impl Default for HeadlessGraphics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphicsContextPort for HeadlessGraphics {
    async fn make_xr_compatible(&self) -> HostResult<()> {
        self.calls.lock().push(GraphicsCall::MakeXrCompatible);
        if self.compatible {
            Ok(())
        } else {
            Err(HostError::NotSupported("context lost".to_owned()))
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.calls
            .lock()
            .push(GraphicsCall::BindFramebuffer(framebuffer));
    }

    fn clear_depth(&self) {
        self.calls.lock().push(GraphicsCall::ClearDepth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn optional_feature_rejection_is_scripted() -> Result<()> {
        let system = HeadlessSystem::new(HeadlessScript {
            reject_optional_features: true,
            ..HeadlessScript::default()
        });
        let full = SessionInit::for_mode(SessionMode::ImmersiveVr);
        assert!(
            system
                .request_session(SessionMode::ImmersiveVr, &full)
                .await
                .is_err()
        );
        let session = system
            .request_session(SessionMode::ImmersiveVr, &full.required_only())
            .await?;
        assert_eq!(session.mode(), SessionMode::ImmersiveVr);
        assert_eq!(system.requests().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn frames_are_delivered_once_per_request() -> Result<()> {
        let system = HeadlessSystem::default();
        system.update_script(|script| script.supported_modes = vec![SessionMode::Inline]);
        system
            .request_session(SessionMode::Inline, &SessionInit::default())
            .await?;
        let session = system.last_session().expect("session granted");

        assert!(!session.tick(0.0));
        let delivered = Arc::new(Mutex::new(0));
        let counter = delivered.clone();
        session.request_animation_frame(Box::new(move |_, frame| {
            assert!(frame.viewer_pose(&ReferenceSpace {
                id: SpaceId(1),
                kind: ReferenceSpaceType::Local,
            })
            .is_some());
            *counter.lock() += 1;
        }));
        assert!(session.tick(16.0));
        assert!(!session.tick(32.0));
        assert_eq!(*delivered.lock(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ending_leaves_the_frame_request_to_its_owner() -> Result<()> {
        let system = HeadlessSystem::default();
        system
            .request_session(SessionMode::ImmersiveVr, &SessionInit::default())
            .await?;
        let session = system.last_session().expect("session granted");
        let id = session.request_animation_frame(Box::new(|_, _| {}));

        session.end();
        assert_eq!(session.pending_request(), Some(id));
        assert!(!session.tick(16.0));

        session.cancel_animation_frame(id);
        assert!(!session.has_pending_frame());
        assert_eq!(session.cancelled_requests(), vec![id]);
        Ok(())
    }

    #[test]
    fn frame_queries_fail_after_invalidation() {
        let frame = HeadlessFrame {
            viewer: Some(stereo_viewer_pose([0.0, 1.6, 0.0])),
            spaces: HashMap::new(),
            hands: HashMap::from([(HandId(1), [0.0, 1.0, 0.0])]),
            failing_joints: HashSet::new(),
            missing_joints: HashSet::new(),
            active: AtomicBool::new(true),
        };
        let space = ReferenceSpace {
            id: SpaceId(9),
            kind: ReferenceSpaceType::Local,
        };
        assert!(matches!(
            frame.joint_pose(HandId(1), HandJoint::ThumbTip, &space),
            Ok(Some(_))
        ));
        frame.invalidate();
        assert!(frame.viewer_pose(&space).is_none());
        assert!(frame.joint_pose(HandId(1), HandJoint::ThumbTip, &space).is_err());
    }

    #[test]
    fn graphics_records_calls() {
        let graphics = HeadlessGraphics::new();
        graphics.bind_framebuffer(Some(FramebufferId(3)));
        graphics.clear_depth();
        assert_eq!(
            graphics.calls(),
            vec![
                GraphicsCall::BindFramebuffer(Some(FramebufferId(3))),
                GraphicsCall::ClearDepth
            ]
        );
        assert_eq!(graphics.count(GraphicsCall::ClearDepth), 1);
    }
}
