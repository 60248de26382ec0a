//! Native-facing entry points.
//!
//! [`XrBridge`] is what a native application links against: integer modes,
//! integer handedness and joint indices, flat out buffers and 0/1 results.
//! It validates the raw arguments and forwards to [`XrRuntime`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{instrument, warn};
use xrlink_events::LifecycleHub;
use xrlink_protocol::{
    BridgeError, BridgeResult, ErrorCode, GraphicsContextPort, HandJoint, Handedness, InputFn,
    LifecycleState, LifecycleTransition, NativeCallbacks, NativeHeap, SessionEventKind,
    SessionFn, SessionMode, SystemHeap, UserData, XrSystemPort,
};
use xrlink_runtime::{RuntimeConfig, XrRuntime};

pub struct BridgeBuilder {
    config: RuntimeConfig,
    system: Option<Arc<dyn XrSystemPort>>,
    graphics: Arc<dyn GraphicsContextPort>,
    heap: Option<Arc<dyn NativeHeap>>,
}

impl BridgeBuilder {
    pub fn new(graphics: Arc<dyn GraphicsContextPort>) -> Self {
        Self {
            config: RuntimeConfig::default(),
            system: None,
            graphics,
            heap: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Without a system the platform is treated as having no XR support.
    pub fn system(mut self, system: Arc<dyn XrSystemPort>) -> Self {
        self.system = Some(system);
        self
    }

    pub fn heap(mut self, heap: Arc<dyn NativeHeap>) -> Self {
        self.heap = Some(heap);
        self
    }

    pub fn build(self) -> XrBridge {
        let heap = self
            .heap
            .unwrap_or_else(|| Arc::new(SystemHeap::new()) as Arc<dyn NativeHeap>);
        XrBridge {
            runtime: XrRuntime::new(self.config, self.system, self.graphics, heap),
        }
    }
}

#[derive(Clone)]
pub struct XrBridge {
    runtime: XrRuntime,
}

impl XrBridge {
    pub fn runtime(&self) -> &XrRuntime {
        &self.runtime
    }

    pub fn state(&self) -> LifecycleState {
        self.runtime.state()
    }

    pub fn lifecycle(&self) -> &LifecycleHub {
        self.runtime.lifecycle()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.runtime.subscribe()
    }

    /// `mode`: 0 inline, 1 immersive-vr, 2 immersive-ar. An unknown mode is
    /// reported as an unsupported session.
    #[instrument(skip(self, callbacks, user_data))]
    pub async fn init(
        &self,
        mode: i32,
        callbacks: NativeCallbacks,
        user_data: UserData,
    ) -> BridgeResult<()> {
        let mode = match SessionMode::try_from(mode) {
            Ok(mode) => mode,
            Err(error) => {
                warn!(%error, "init rejected");
                if let Some(callback) = &callbacks.error {
                    callback(user_data, ErrorCode::SessionUnsupported.as_raw());
                }
                return Err(error);
            }
        };
        self.runtime.init(mode, callbacks, user_data).await
    }

    pub async fn request_session(&self) -> BridgeResult<()> {
        self.runtime.request_session().await
    }

    pub async fn request_ar_session(&self) -> BridgeResult<()> {
        self.runtime.request_ar_session().await
    }

    pub fn request_exit(&self) {
        self.runtime.request_exit();
    }

    pub fn set_projection_params(&self, near: f32, far: f32) {
        self.runtime.set_projection_params(near, far);
    }

    pub fn set_session_blur_callback(&self, callback: SessionFn, user_data: UserData) {
        self.session_callback(SessionEventKind::Blur, callback, user_data);
    }

    pub fn set_session_focus_callback(&self, callback: SessionFn, user_data: UserData) {
        self.session_callback(SessionEventKind::Focus, callback, user_data);
    }

    pub fn set_select_callback(&self, callback: InputFn, user_data: UserData) {
        self.input_callback(SessionEventKind::Select, callback, user_data);
    }

    pub fn set_select_start_callback(&self, callback: InputFn, user_data: UserData) {
        self.input_callback(SessionEventKind::SelectStart, callback, user_data);
    }

    pub fn set_select_end_callback(&self, callback: InputFn, user_data: UserData) {
        self.input_callback(SessionEventKind::SelectEnd, callback, user_data);
    }

    /// Fills `out` with up to `max` descriptors and stores the count.
    pub fn get_input_sources(&self, out: &mut [u8], max: i32, out_count: &mut i32) {
        let max = usize::try_from(max).unwrap_or(0);
        let count = self.runtime.get_input_sources(out, max);
        *out_count = i32::try_from(count).unwrap_or(i32::MAX);
    }

    /// Writes the 132-byte input pose; 1 on success. Only valid inside the
    /// frame callback.
    pub fn get_input_pose(&self, source_index: i32, out: &mut [u8]) -> i32 {
        i32::from(self.runtime.get_input_pose(source_index, out))
    }

    pub fn is_hand_tracking_supported(&self) -> i32 {
        i32::from(self.runtime.is_hand_tracking_supported())
    }

    /// `handedness`: 0 left, 1 right. `joint_index` in `0..25`.
    pub fn get_hand_joint_pose(&self, handedness: i32, joint_index: i32, out: &mut [u8]) -> i32 {
        let handedness = match Handedness::from_raw(handedness) {
            Some(handedness @ (Handedness::Left | Handedness::Right)) => handedness,
            _ => return 0,
        };
        let Some(joint) = usize::try_from(joint_index)
            .ok()
            .and_then(HandJoint::from_index)
        else {
            return 0;
        };
        i32::from(self.runtime.get_hand_joint_pose(handedness, joint, out))
    }

    pub fn is_ar_session(&self) -> i32 {
        i32::from(self.runtime.is_ar_session())
    }

    fn session_callback(&self, kind: SessionEventKind, callback: SessionFn, user_data: UserData) {
        if let Err(error) = self.runtime.set_session_callback(kind, callback, user_data) {
            log_registration_error(kind, &error);
        }
    }

    fn input_callback(&self, kind: SessionEventKind, callback: InputFn, user_data: UserData) {
        if let Err(error) = self.runtime.set_input_callback(kind, callback, user_data) {
            log_registration_error(kind, &error);
        }
    }
}

fn log_registration_error(kind: SessionEventKind, error: &BridgeError) {
    warn!(%kind, %error, "callback registration rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use parking_lot::Mutex;
    use xrlink_headless::{HeadlessGraphics, HeadlessScript, HeadlessSystem};
    use xrlink_protocol::decode_input_source;
    use xrlink_protocol::InputPose;
    use xrlink_protocol::layout::{
        HAND_JOINT_RECORD_SIZE, INPUT_POSE_SIZE, INPUT_SOURCE_DESCRIPTOR_SIZE,
    };

    #[derive(Default)]
    struct Log {
        errors: Vec<i32>,
        starts: usize,
        frames: usize,
    }

    fn callbacks(log: &Arc<Mutex<Log>>) -> NativeCallbacks {
        let errors = log.clone();
        let starts = log.clone();
        let frames = log.clone();
        NativeCallbacks::new()
            .on_error(move |_, code| errors.lock().errors.push(code))
            .on_session_start(move |_| starts.lock().starts += 1)
            .on_frame(move |_, _, _, _, _| frames.lock().frames += 1)
    }

    fn bridge(script: HeadlessScript) -> (XrBridge, Arc<HeadlessSystem>) {
        let system = Arc::new(HeadlessSystem::new(script));
        let bridge = BridgeBuilder::new(Arc::new(HeadlessGraphics::new()))
            .system(system.clone())
            .build();
        (bridge, system)
    }

    #[tokio::test]
    async fn vr_session_succeeds_through_the_fallback_path() -> Result<()> {
        let (bridge, system) = bridge(HeadlessScript {
            reject_optional_features: true,
            ..HeadlessScript::default()
        });
        let log = Arc::new(Mutex::new(Log::default()));
        bridge.init(1, callbacks(&log), UserData(0)).await?;
        bridge.request_session().await?;

        assert_eq!(bridge.state(), LifecycleState::SessionActive);
        assert_eq!(system.requests().len(), 2);
        let log = log.lock();
        assert!(log.errors.is_empty());
        assert_eq!(log.starts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_mode_is_reported_as_unsupported() {
        let (bridge, system) = bridge(HeadlessScript::default());
        let log = Arc::new(Mutex::new(Log::default()));
        assert!(bridge.init(7, callbacks(&log), UserData(0)).await.is_err());
        assert_eq!(log.lock().errors, vec![-4]);
        assert_eq!(bridge.state(), LifecycleState::Uninitialized);
        assert!(system.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_platform_support_is_reported_once() {
        let bridge = BridgeBuilder::new(Arc::new(HeadlessGraphics::new())).build();
        let log = Arc::new(Mutex::new(Log::default()));
        assert!(bridge.init(1, callbacks(&log), UserData(0)).await.is_err());
        assert!(bridge.request_session().await.is_err());
        assert_eq!(log.lock().errors, vec![-2]);
    }

    #[tokio::test]
    async fn joint_query_without_frame_returns_zero_and_leaves_buffer() -> Result<()> {
        let (bridge, system) = bridge(HeadlessScript::default());
        let log = Arc::new(Mutex::new(Log::default()));
        bridge.init(1, callbacks(&log), UserData(0)).await?;
        bridge.request_session().await?;
        system
            .last_session()
            .expect("granted")
            .add_hand(Handedness::Left);

        let mut out = [0x5Au8; HAND_JOINT_RECORD_SIZE];
        assert_eq!(bridge.get_hand_joint_pose(0, 24, &mut out), 0);
        assert!(out.iter().all(|byte| *byte == 0x5A));
        assert_eq!(bridge.get_hand_joint_pose(-1, 0, &mut out), 0);
        assert_eq!(bridge.get_hand_joint_pose(0, 25, &mut out), 0);
        assert_eq!(bridge.is_hand_tracking_supported(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn two_sources_are_listed_with_live_attributes() -> Result<()> {
        let (bridge, system) = bridge(HeadlessScript::default());
        let log = Arc::new(Mutex::new(Log::default()));
        bridge.init(1, callbacks(&log), UserData(0)).await?;
        bridge.request_session().await?;
        let session = system.last_session().expect("granted");
        session.add_controller(Handedness::Left);
        session.add_hand(Handedness::Right);

        let mut out = vec![0u8; 10 * INPUT_SOURCE_DESCRIPTOR_SIZE];
        let mut count = -1;
        bridge.get_input_sources(&mut out, 10, &mut count);
        assert_eq!(count, 2);
        let (left, cursor) = decode_input_source(&out, 0).expect("descriptor");
        let (right, _) = decode_input_source(&out, cursor).expect("descriptor");
        assert_eq!(left.handedness, Handedness::Left);
        assert!(left.has_controller && !left.has_hand);
        assert_eq!(right.handedness, Handedness::Right);
        assert!(right.has_hand);
        Ok(())
    }

    #[tokio::test]
    async fn input_pose_is_written_only_during_a_frame() -> Result<()> {
        let (bridge, system) = bridge(HeadlessScript::default());
        let poses = Arc::new(Mutex::new(Vec::new()));
        let sink = poses.clone();
        let in_frame = bridge.clone();
        let callbacks = NativeCallbacks::new().on_frame(move |_, _, _, _, _| {
            let mut out = [0u8; INPUT_POSE_SIZE];
            let written = in_frame.get_input_pose(0, &mut out);
            let missing = in_frame.get_input_pose(3, &mut [0u8; INPUT_POSE_SIZE]);
            sink.lock().push((written, missing, InputPose::decode(&out, 0)));
        });
        bridge.init(1, callbacks, UserData(0)).await?;
        bridge.request_session().await?;
        let session = system.last_session().expect("granted");
        session.add_controller(Handedness::Right);

        let mut outside = [0x11u8; INPUT_POSE_SIZE];
        assert_eq!(bridge.get_input_pose(0, &mut outside), 0);
        assert!(outside.iter().all(|byte| *byte == 0x11));

        assert!(session.tick(8.0));
        let poses = poses.lock();
        let (written, missing, pose) = &poses[0];
        assert_eq!((*written, *missing), (1, 0));
        assert!(!pose.emulated_position);
        bridge.request_exit();
        Ok(())
    }

    #[tokio::test]
    async fn select_registered_early_reaches_the_native_callback() -> Result<()> {
        let (bridge, system) = bridge(HeadlessScript::default());
        let selects = Arc::new(Mutex::new(Vec::new()));
        let sink = selects.clone();
        bridge.set_select_callback(
            Arc::new(move |descriptor: &[u8], user: UserData| {
                sink.lock().push((decode_input_source(descriptor, 0), user));
            }),
            UserData(42),
        );
        let focus = Arc::new(Mutex::new(0));
        let focus_sink = focus.clone();
        bridge.set_session_focus_callback(
            Arc::new(move |_: UserData| *focus_sink.lock() += 1),
            UserData(1),
        );

        let log = Arc::new(Mutex::new(Log::default()));
        bridge.init(1, callbacks(&log), UserData(0)).await?;
        bridge.request_session().await?;
        let session = system.last_session().expect("granted");
        session.add_hand(Handedness::Left);
        let controller = session.add_controller(Handedness::Right);
        session.fire_input(SessionEventKind::Select, controller);
        session.fire_session_event(SessionEventKind::Focus);

        let selects = selects.lock();
        assert_eq!(selects.len(), 1);
        let (descriptor, user) = &selects[0];
        let (descriptor, _) = descriptor.expect("decodable");
        assert_eq!(descriptor.index, 1);
        assert_eq!(*user, UserData(42));
        assert_eq!(*focus.lock(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ar_request_sets_the_ar_flag() -> Result<()> {
        let (bridge, _system) = bridge(HeadlessScript::default());
        let log = Arc::new(Mutex::new(Log::default()));
        bridge.init(0, callbacks(&log), UserData(0)).await?;
        assert_eq!(bridge.is_ar_session(), 0);
        bridge.request_ar_session().await?;
        assert_eq!(bridge.is_ar_session(), 1);
        Ok(())
    }
}
