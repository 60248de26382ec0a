//! Queries the native side may issue at any time. Pose queries only succeed
//! synchronously inside a frame callback; everything else needs an active
//! session. Misuse returns a sentinel and never writes the out buffer.

use std::sync::Arc;

use tracing::{debug, warn};
use xrlink_protocol::hand::resolve_joint;
use xrlink_protocol::layout::{
    HAND_JOINT_RECORD_SIZE, INPUT_POSE_SIZE, INPUT_SOURCE_DESCRIPTOR_SIZE,
};
use xrlink_protocol::pose::IDENTITY_MATRIX;
use xrlink_protocol::{
    HandJoint, Handedness, InputPose, InputSource, SessionMode, XrSessionPort,
    encode_input_pose, encode_input_source,
};

use crate::XrRuntime;
use crate::frame::FrameContext;

impl XrRuntime {
    fn active_port(&self) -> Option<Arc<dyn XrSessionPort>> {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.port.clone())
    }

    /// The current frame, provided it belongs to the session still active.
    fn current_frame(&self) -> Option<FrameContext> {
        let context = self.inner.frame.lock().clone()?;
        let state = self.inner.state.lock();
        let active = state.active.as_ref()?;
        (active.id == context.session_id).then_some(context)
    }

    /// Writes up to `max` descriptors into `out` and returns how many were
    /// written. Returns 0 without an active session.
    pub fn get_input_sources(&self, out: &mut [u8], max: usize) -> usize {
        let Some(port) = self.active_port() else {
            debug!("input sources queried without an active session");
            return 0;
        };
        let capacity = max.min(out.len() / INPUT_SOURCE_DESCRIPTOR_SIZE);
        let sources = port.input_sources();
        let mut offset = 0;
        let mut count = 0;
        for (index, source) in sources.iter().take(capacity).enumerate() {
            offset = encode_input_source(out, offset, source, index as i32);
            count += 1;
        }
        count
    }

    /// Writes the 132-byte pose of the input source at `index`.
    pub fn get_input_pose(&self, index: i32, out: &mut [u8]) -> bool {
        let Some(context) = self.current_frame() else {
            warn!("input pose queried outside of a frame callback");
            return false;
        };
        if out.len() < INPUT_POSE_SIZE {
            return false;
        }
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        let sources = context.port.input_sources();
        let Some(pose) = sources
            .get(index)
            .and_then(|source| input_pose(&context, source))
        else {
            return false;
        };
        encode_input_pose(out, 0, &pose);
        true
    }

    /// Whether any live input source carries hand data.
    pub fn is_hand_tracking_supported(&self) -> bool {
        self.active_port()
            .is_some_and(|port| port.input_sources().iter().any(InputSource::has_hand))
    }

    /// Writes one 32-byte joint record for the first hand source of the
    /// given handedness.
    pub fn get_hand_joint_pose(
        &self,
        handedness: Handedness,
        joint: HandJoint,
        out: &mut [u8],
    ) -> bool {
        let Some(context) = self.current_frame() else {
            return false;
        };
        if out.len() < HAND_JOINT_RECORD_SIZE || handedness == Handedness::Unknown {
            return false;
        }
        let sources = context.port.input_sources();
        let Some(hand) = sources
            .iter()
            .find(|source| source.handedness == handedness && source.hand.is_some())
            .and_then(|source| source.hand)
        else {
            return false;
        };
        match resolve_joint(context.frame.as_ref(), hand, joint, &context.space) {
            Ok(Some(record)) => {
                record.encode(out, 0);
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(joint = joint.name(), %hand, %error, "failed to resolve joint pose");
                false
            }
        }
    }

    /// Reflects the stored mode, which `request_ar_session` switches to AR.
    pub fn is_ar_session(&self) -> bool {
        self.mode() == SessionMode::ImmersiveAr
    }
}

fn input_pose(context: &FrameContext, source: &InputSource) -> Option<InputPose> {
    let ray = context
        .frame
        .pose(source.target_ray_space?, &context.space)?;
    let grip = source
        .grip_space
        .and_then(|space| context.frame.pose(space, &context.space))
        .map_or(IDENTITY_MATRIX, |pose| pose.transform.matrix);
    Some(InputPose {
        target_ray: ray.transform.matrix,
        grip,
        emulated_position: ray.emulated_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, Recorder};
    use anyhow::Result;
    use parking_lot::Mutex;
    use xrlink_headless::HeadlessScript;
    use xrlink_protocol::{HandJointRecord, NativeCallbacks, UserData, decode_input_source};

    #[tokio::test]
    async fn input_sources_report_live_attributes() -> Result<()> {
        let harness = Harness::new(HeadlessScript::default());
        let recorder = Recorder::default();
        let mut out = vec![0u8; 10 * INPUT_SOURCE_DESCRIPTOR_SIZE];
        assert_eq!(harness.runtime.get_input_sources(&mut out, 10), 0);

        harness
            .runtime
            .init(SessionMode::ImmersiveVr, recorder.callbacks(), UserData(0))
            .await?;
        harness.runtime.request_session().await?;
        let session = harness.session();
        session.add_controller(Handedness::Left);
        session.add_hand(Handedness::Right);

        assert_eq!(harness.runtime.get_input_sources(&mut out, 10), 2);
        let (left, cursor) = decode_input_source(&out, 0).expect("left");
        let (right, _) = decode_input_source(&out, cursor).expect("right");
        assert_eq!((left.index, left.handedness), (0, Handedness::Left));
        assert!(!left.has_hand && left.has_controller);
        assert_eq!((right.index, right.handedness), (1, Handedness::Right));
        assert!(right.has_hand);

        assert_eq!(harness.runtime.get_input_sources(&mut out, 1), 1);
        assert!(harness.runtime.is_hand_tracking_supported());
        Ok(())
    }

    #[tokio::test]
    async fn pose_queries_fail_outside_a_frame() -> Result<()> {
        let harness = Harness::new(HeadlessScript::default());
        let recorder = Recorder::default();
        harness
            .runtime
            .init(SessionMode::ImmersiveVr, recorder.callbacks(), UserData(0))
            .await?;
        harness.runtime.request_session().await?;
        harness.session().add_hand(Handedness::Left);

        let mut out = [0xAAu8; HAND_JOINT_RECORD_SIZE];
        assert!(
            !harness
                .runtime
                .get_hand_joint_pose(Handedness::Left, HandJoint::PinkyFingerTip, &mut out)
        );
        assert!(out.iter().all(|byte| *byte == 0xAA));

        let mut pose = [0xAAu8; INPUT_POSE_SIZE];
        assert!(!harness.runtime.get_input_pose(0, &mut pose));
        assert!(pose.iter().all(|byte| *byte == 0xAA));
        Ok(())
    }

    #[tokio::test]
    async fn pose_queries_resolve_inside_the_frame_callback() -> Result<()> {
        let harness = Harness::new(HeadlessScript::default());
        let runtime = harness.runtime.clone();
        let results = Arc::new(Mutex::new(None));
        let sink = results.clone();
        let callbacks = NativeCallbacks::new().on_frame(move |_, _, _, _, _| {
            let mut input = [0u8; INPUT_POSE_SIZE];
            let mut joint = [0u8; HAND_JOINT_RECORD_SIZE];
            let mut missing = [0u8; INPUT_POSE_SIZE];
            let input_ok = runtime.get_input_pose(0, &mut input);
            let joint_ok =
                runtime.get_hand_joint_pose(Handedness::Right, HandJoint::ThumbTip, &mut joint);
            let missing_ok = runtime.get_input_pose(5, &mut missing);
            *sink.lock() = Some((input_ok, input, joint_ok, joint, missing_ok));
        });
        harness
            .runtime
            .init(SessionMode::ImmersiveVr, callbacks, UserData(0))
            .await?;
        harness.runtime.request_session().await?;
        let session = harness.session();
        session.add_controller(Handedness::Left);
        session.add_hand(Handedness::Right);
        session.tick(1.0);

        let (input_ok, input, joint_ok, joint, missing_ok) =
            results.lock().take().expect("frame delivered");
        assert!(input_ok);
        let pose = InputPose::decode(&input, 0);
        assert!(!pose.emulated_position);
        assert_ne!(pose.grip, IDENTITY_MATRIX);
        assert!(joint_ok);
        let (record, _) = HandJointRecord::decode(&joint, 0);
        assert!(record.is_tracked());
        assert!(!missing_ok);
        Ok(())
    }

    #[tokio::test]
    async fn hand_source_without_grip_reports_identity_grip() -> Result<()> {
        let harness = Harness::new(HeadlessScript::default());
        let runtime = harness.runtime.clone();
        let results = Arc::new(Mutex::new(None));
        let sink = results.clone();
        let callbacks = NativeCallbacks::new().on_frame(move |_, _, _, _, _| {
            let mut out = [0u8; INPUT_POSE_SIZE];
            if runtime.get_input_pose(0, &mut out) {
                *sink.lock() = Some(InputPose::decode(&out, 0));
            }
        });
        harness
            .runtime
            .init(SessionMode::ImmersiveVr, callbacks, UserData(0))
            .await?;
        harness.runtime.request_session().await?;
        let session = harness.session();
        session.add_hand(Handedness::Left);
        session.tick(1.0);

        let pose = results.lock().take().expect("pose written");
        assert_eq!(pose.grip, IDENTITY_MATRIX);
        assert!(pose.emulated_position);
        Ok(())
    }

    #[tokio::test]
    async fn ar_flag_follows_the_stored_mode() -> Result<()> {
        let harness = Harness::new(HeadlessScript::default());
        let recorder = Recorder::default();
        assert!(!harness.runtime.is_ar_session());
        harness
            .runtime
            .init(SessionMode::ImmersiveAr, recorder.callbacks(), UserData(0))
            .await?;
        assert!(harness.runtime.is_ar_session());
        assert!(!harness.runtime.is_hand_tracking_supported());
        Ok(())
    }
}
