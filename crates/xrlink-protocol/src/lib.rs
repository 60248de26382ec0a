//! # xrlink-protocol: XR marshaling contract
//!
//! This crate defines the fixed binary layouts, encoders, host ports and error
//! taxonomy shared by every xrlink crate. The native side only ever sees flat
//! little-endian buffers and plain callbacks; everything here exists to produce
//! those buffers deterministically from the host's object model.
//!
//! It is intentionally runtime-free (no tokio) so it can be used as a pure
//! contract crate by hosts and by native consumers decoding buffers.
//!
//! ## Module Overview
//!
//! - [`codec`]: vec3 / quaternion / 4×4 matrix encoders and decoders
//! - [`layout`]: byte sizes and offsets of every record crossing the boundary
//! - [`hand`]: 25-joint hand table, joint record and hand serializer
//! - [`input`]: input source model and the 20-byte descriptor
//! - [`pose`]: transforms, views, viewports and the view record
//! - [`mode`]: session modes, features, reference spaces, lifecycle states
//! - [`ports`]: host boundary traits (system, session, frame, graphics)
//! - [`heap`]: native allocator port and scoped leases
//! - [`callbacks`]: native callback shapes and the user-data token
//! - [`lifecycle`]: lifecycle transition records
//! - [`ids`]: session ids and opaque host handles
//! - [`error`]: HostError, BridgeError, ErrorCode

pub mod callbacks;
pub mod codec;
pub mod error;
pub mod hand;
pub mod heap;
pub mod ids;
pub mod input;
pub mod layout;
pub mod lifecycle;
pub mod mode;
pub mod pose;
pub mod ports;

// Re-export the most commonly used types at the crate root.
pub use callbacks::{ErrorFn, FrameFn, InputFn, NativeCallbacks, SessionFn, UserData};
pub use error::{BridgeError, BridgeResult, ErrorCode, HostError, HostResult};
pub use hand::{
    DEFAULT_JOINT_RADIUS, Finger, HandData, HandJoint, HandJointRecord, encode_hand, read_hand,
};
pub use heap::{HeapLease, HeapStats, NativeBlock, NativeHeap, SystemHeap};
pub use ids::{
    FrameRequestId, FramebufferId, HandId, InputSourceId, ListenerId, SessionId, SpaceId,
};
pub use input::{
    Handedness, InputSource, InputSourceDescriptor, TargetRayMode, decode_input_source,
    encode_input_source,
};
pub use lifecycle::LifecycleTransition;
pub use mode::{LifecycleState, ReferenceSpaceType, SessionFeature, SessionInit, SessionMode};
pub use pose::{
    Eye, InputPose, JointPose, Pose, ReferenceSpace, RigidTransform, View, ViewRecord,
    ViewerPose, Viewport, encode_input_pose, encode_view,
};
pub use ports::{
    AnimationFrameCallback, GraphicsContextPort, SessionEvent, SessionEventKind,
    SessionEventListener, XrFrame, XrSessionPort, XrSystemPort,
};
