//! Per-frame marshaling.
//!
//! Each host animation frame re-requests the next one first, then flattens
//! the viewer pose and both hands into native buffers, invokes the frame
//! callback and releases everything again before returning.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use xrlink_protocol::codec::{encode_i32, encode_matrix4x4};
use xrlink_protocol::layout::{
    FRAME_VIEWS_SIZE, HAND_BUFFER_SIZE, HAND_FLAGS_OFFSET, I32_SIZE, LEFT_HAND_OFFSET,
    MODEL_MATRIX_OFFSET, RIGHT_HAND_OFFSET, VIEW_RECORD_SIZE, VIEW_SLOTS,
};
use xrlink_protocol::{
    Handedness, HeapLease, InputSource, ReferenceSpace, SessionId, ViewerPose, XrFrame,
    XrSessionPort, encode_hand, encode_view,
};

use crate::XrRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The native frame callback ran.
    Delivered,
    /// The session is gone; no further frame was requested.
    Stopped,
    /// Tracking lost for this frame.
    NoViewerPose,
    AllocationFailed,
    /// No frame callback registered; the loop keeps running.
    NoConsumer,
}

/// The frame that pose queries resolve against while a frame callback runs.
#[derive(Clone)]
pub(crate) struct FrameContext {
    pub(crate) session_id: SessionId,
    pub(crate) frame: Arc<dyn XrFrame>,
    pub(crate) space: ReferenceSpace,
    pub(crate) port: Arc<dyn XrSessionPort>,
}

/// Clears the current-frame slot on scope exit, including unwinding.
struct FrameGuard<'a> {
    slot: &'a Mutex<Option<FrameContext>>,
}

impl<'a> FrameGuard<'a> {
    fn enter(slot: &'a Mutex<Option<FrameContext>>, context: FrameContext) -> Self {
        *slot.lock() = Some(context);
        Self { slot }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Writes each view into its eye slot and the head transform into the
/// trailing model matrix. Views without a viewport get a zero viewport.
pub fn encode_frame_views(buffer: &mut [u8], pose: &ViewerPose, session: &dyn XrSessionPort) {
    for view in &pose.views {
        let slot = view.eye.slot();
        if slot >= VIEW_SLOTS {
            continue;
        }
        let viewport = session.viewport(view).unwrap_or_default();
        encode_view(buffer, slot * VIEW_RECORD_SIZE, view, viewport);
    }
    encode_matrix4x4(buffer, MODEL_MATRIX_OFFSET, &pose.transform.matrix);
}

/// Writes both hand halves and the two detection flags. A half with no
/// tracked hand is written as untracked joints and its flag stays 0.
pub fn encode_frame_hands(
    buffer: &mut [u8],
    sources: &[InputSource],
    frame: &dyn XrFrame,
    space: &ReferenceSpace,
) {
    let mut left = false;
    let mut right = false;
    for source in sources {
        let Some(hand) = source.hand else {
            continue;
        };
        match source.handedness {
            Handedness::Left => {
                encode_hand(buffer, LEFT_HAND_OFFSET, Some(hand), Some(frame), Some(space));
                left = true;
            }
            Handedness::Right => {
                encode_hand(buffer, RIGHT_HAND_OFFSET, Some(hand), Some(frame), Some(space));
                right = true;
            }
            Handedness::Unknown => {}
        }
    }
    if !left {
        encode_hand(buffer, LEFT_HAND_OFFSET, None, None, None);
    }
    if !right {
        encode_hand(buffer, RIGHT_HAND_OFFSET, None, None, None);
    }
    encode_i32(buffer, HAND_FLAGS_OFFSET, i32::from(left));
    encode_i32(buffer, HAND_FLAGS_OFFSET + I32_SIZE, i32::from(right));
}

impl XrRuntime {
    pub(crate) fn schedule_frame(&self, port: &Arc<dyn XrSessionPort>, session_id: &SessionId) {
        let inner = Arc::downgrade(&self.inner);
        let id = session_id.clone();
        let request = port.request_animation_frame(Box::new(move |time, frame| {
            if let Some(runtime) = XrRuntime::from_weak(&inner) {
                runtime.on_animation_frame(&id, time, frame);
            }
        }));
        let mut state = self.inner.state.lock();
        if let Some(active) = state.active.as_mut()
            && active.id == *session_id
        {
            active.frame_request = Some(request);
        }
    }

    /// Host animation frame entry point for `session_id`.
    pub fn on_animation_frame(
        &self,
        session_id: &SessionId,
        time: f64,
        frame: Arc<dyn XrFrame>,
    ) -> FrameOutcome {
        let (port, space, callback, user_data) = {
            let state = self.inner.state.lock();
            let Some(active) = state.active.as_ref().filter(|active| active.id == *session_id)
            else {
                debug!(session_id = %session_id, "frame after session end; loop stopped");
                return FrameOutcome::Stopped;
            };
            (
                active.port.clone(),
                active.reference_space,
                state.callbacks.frame.clone(),
                state.user_data,
            )
        };
        self.schedule_frame(&port, session_id);

        let Some(callback) = callback else {
            return FrameOutcome::NoConsumer;
        };
        let Some(space) = space else {
            return FrameOutcome::NoViewerPose;
        };
        let Some(pose) = frame.viewer_pose(&space) else {
            trace!(time, "no viewer pose; frame skipped");
            return FrameOutcome::NoViewerPose;
        };

        let heap = self.inner.heap.as_ref();
        let Some(mut views) = HeapLease::alloc(heap, FRAME_VIEWS_SIZE) else {
            warn!(size = FRAME_VIEWS_SIZE, "view buffer allocation failed; frame skipped");
            return FrameOutcome::AllocationFailed;
        };
        let Some(mut hands) = HeapLease::alloc(heap, HAND_BUFFER_SIZE) else {
            warn!(size = HAND_BUFFER_SIZE, "hand buffer allocation failed; frame skipped");
            return FrameOutcome::AllocationFailed;
        };
        encode_frame_views(&mut views, &pose, port.as_ref());
        encode_frame_hands(&mut hands, &port.input_sources(), frame.as_ref(), &space);

        let graphics = &self.inner.graphics;
        graphics.bind_framebuffer(port.framebuffer());
        if self.inner.config.clear_depth_each_frame {
            graphics.clear_depth();
        }

        let _current = FrameGuard::enter(
            &self.inner.frame,
            FrameContext {
                session_id: session_id.clone(),
                frame,
                space,
                port,
            },
        );
        callback(
            user_data,
            time,
            &views[MODEL_MATRIX_OFFSET..],
            &views[..MODEL_MATRIX_OFFSET],
            &hands,
        );
        FrameOutcome::Delivered
    }
}
