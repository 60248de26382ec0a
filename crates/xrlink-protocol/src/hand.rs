//! Hand skeleton: the 25-joint table and the hand serializer.
//!
//! A hand is always written as exactly 25 joint records of 32 bytes. Joints
//! the host cannot resolve are written as untracked (zero position, identity
//! rotation, zero radius), so "no hand" and "hand present but untracked" are
//! indistinguishable on the wire.

use crate::codec::{
    decode_f32, decode_i32, decode_quat, decode_vec3, encode_f32, encode_quat, encode_vec3,
};
use crate::error::HostResult;
use crate::ids::HandId;
use crate::input::Handedness;
use crate::layout::{
    HAND_BUFFER_SIZE, HAND_DATA_SIZE, HAND_FLAGS_OFFSET, HAND_JOINT_COUNT, I32_SIZE,
    LEFT_HAND_OFFSET, RIGHT_HAND_OFFSET,
};
use crate::pose::{IDENTITY_QUAT, JointPose, ReferenceSpace};
use crate::ports::XrFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Radius written when the host resolves a joint but reports no radius.
pub const DEFAULT_JOINT_RADIUS: f32 = 0.01;

/// Hand joints in wire order. Index 0 is always the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandJoint {
    Wrist,
    ThumbMetacarpal,
    ThumbPhalanxProximal,
    ThumbPhalanxDistal,
    ThumbTip,
    IndexFingerMetacarpal,
    IndexFingerPhalanxProximal,
    IndexFingerPhalanxIntermediate,
    IndexFingerPhalanxDistal,
    IndexFingerTip,
    MiddleFingerMetacarpal,
    MiddleFingerPhalanxProximal,
    MiddleFingerPhalanxIntermediate,
    MiddleFingerPhalanxDistal,
    MiddleFingerTip,
    RingFingerMetacarpal,
    RingFingerPhalanxProximal,
    RingFingerPhalanxIntermediate,
    RingFingerPhalanxDistal,
    RingFingerTip,
    PinkyFingerMetacarpal,
    PinkyFingerPhalanxProximal,
    PinkyFingerPhalanxIntermediate,
    PinkyFingerPhalanxDistal,
    PinkyFingerTip,
}

impl HandJoint {
    pub const ALL: [HandJoint; HAND_JOINT_COUNT] = [
        Self::Wrist,
        Self::ThumbMetacarpal,
        Self::ThumbPhalanxProximal,
        Self::ThumbPhalanxDistal,
        Self::ThumbTip,
        Self::IndexFingerMetacarpal,
        Self::IndexFingerPhalanxProximal,
        Self::IndexFingerPhalanxIntermediate,
        Self::IndexFingerPhalanxDistal,
        Self::IndexFingerTip,
        Self::MiddleFingerMetacarpal,
        Self::MiddleFingerPhalanxProximal,
        Self::MiddleFingerPhalanxIntermediate,
        Self::MiddleFingerPhalanxDistal,
        Self::MiddleFingerTip,
        Self::RingFingerMetacarpal,
        Self::RingFingerPhalanxProximal,
        Self::RingFingerPhalanxIntermediate,
        Self::RingFingerPhalanxDistal,
        Self::RingFingerTip,
        Self::PinkyFingerMetacarpal,
        Self::PinkyFingerPhalanxProximal,
        Self::PinkyFingerPhalanxIntermediate,
        Self::PinkyFingerPhalanxDistal,
        Self::PinkyFingerTip,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Host joint name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbMetacarpal => "thumb-metacarpal",
            Self::ThumbPhalanxProximal => "thumb-phalanx-proximal",
            Self::ThumbPhalanxDistal => "thumb-phalanx-distal",
            Self::ThumbTip => "thumb-tip",
            Self::IndexFingerMetacarpal => "index-finger-metacarpal",
            Self::IndexFingerPhalanxProximal => "index-finger-phalanx-proximal",
            Self::IndexFingerPhalanxIntermediate => "index-finger-phalanx-intermediate",
            Self::IndexFingerPhalanxDistal => "index-finger-phalanx-distal",
            Self::IndexFingerTip => "index-finger-tip",
            Self::MiddleFingerMetacarpal => "middle-finger-metacarpal",
            Self::MiddleFingerPhalanxProximal => "middle-finger-phalanx-proximal",
            Self::MiddleFingerPhalanxIntermediate => "middle-finger-phalanx-intermediate",
            Self::MiddleFingerPhalanxDistal => "middle-finger-phalanx-distal",
            Self::MiddleFingerTip => "middle-finger-tip",
            Self::RingFingerMetacarpal => "ring-finger-metacarpal",
            Self::RingFingerPhalanxProximal => "ring-finger-phalanx-proximal",
            Self::RingFingerPhalanxIntermediate => "ring-finger-phalanx-intermediate",
            Self::RingFingerPhalanxDistal => "ring-finger-phalanx-distal",
            Self::RingFingerTip => "ring-finger-tip",
            Self::PinkyFingerMetacarpal => "pinky-finger-metacarpal",
            Self::PinkyFingerPhalanxProximal => "pinky-finger-phalanx-proximal",
            Self::PinkyFingerPhalanxIntermediate => "pinky-finger-phalanx-intermediate",
            Self::PinkyFingerPhalanxDistal => "pinky-finger-phalanx-distal",
            Self::PinkyFingerTip => "pinky-finger-tip",
        }
    }

    /// The finger chain this joint belongs to; `None` for the wrist.
    pub fn finger(self) -> Option<Finger> {
        Finger::ALL
            .into_iter()
            .find(|finger| finger.joints().contains(&self))
    }
}

/// Finger chains, ordered from the palm outwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Self::Thumb,
        Self::Index,
        Self::Middle,
        Self::Ring,
        Self::Pinky,
    ];

    pub fn joints(self) -> &'static [HandJoint] {
        let (start, len) = match self {
            Self::Thumb => (1, 4),
            Self::Index => (5, 5),
            Self::Middle => (10, 5),
            Self::Ring => (15, 5),
            Self::Pinky => (20, 5),
        };
        &HandJoint::ALL[start..start + len]
    }
}

/// One 32-byte joint record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandJointRecord {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub radius: f32,
}

impl HandJointRecord {
    pub const UNTRACKED: Self = Self {
        position: [0.0; 3],
        orientation: IDENTITY_QUAT,
        radius: 0.0,
    };

    pub fn from_pose(pose: &JointPose) -> Self {
        Self {
            position: pose.transform.position,
            orientation: pose.transform.orientation,
            radius: pose.radius.unwrap_or(DEFAULT_JOINT_RADIUS),
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.radius > 0.0
    }

    pub fn encode(&self, buffer: &mut [u8], offset: usize) -> usize {
        let offset = encode_vec3(buffer, offset, self.position);
        let offset = encode_quat(buffer, offset, self.orientation);
        encode_f32(buffer, offset, self.radius)
    }

    pub fn decode(buffer: &[u8], offset: usize) -> (Self, usize) {
        let (position, cursor) = decode_vec3(buffer, offset);
        let (orientation, cursor) = decode_quat(buffer, cursor);
        let (radius, cursor) = decode_f32(buffer, cursor);
        (
            Self {
                position,
                orientation,
                radius,
            },
            cursor,
        )
    }
}

/// Resolves one joint against the host.
pub fn resolve_joint(
    frame: &dyn XrFrame,
    hand: HandId,
    joint: HandJoint,
    space: &ReferenceSpace,
) -> HostResult<Option<HandJointRecord>> {
    Ok(frame
        .joint_pose(hand, joint, space)?
        .map(|pose| HandJointRecord::from_pose(&pose)))
}

/// Serializes 25 joints starting at `offset` and returns `offset + 800`.
///
/// Missing hand, frame or reference space zero-fills every slot. Otherwise
/// each joint is resolved on its own: a joint the host cannot resolve, or
/// whose resolution fails, is written untracked and the remaining joints are
/// still serialized.
pub fn encode_hand(
    buffer: &mut [u8],
    offset: usize,
    hand: Option<HandId>,
    frame: Option<&dyn XrFrame>,
    space: Option<&ReferenceSpace>,
) -> usize {
    let (Some(hand), Some(frame), Some(space)) = (hand, frame, space) else {
        return HandJoint::ALL.iter().fold(offset, |cursor, _| {
            HandJointRecord::UNTRACKED.encode(buffer, cursor)
        });
    };

    let mut cursor = offset;
    for joint in HandJoint::ALL {
        let record = match resolve_joint(frame, hand, joint, space) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(joint = joint.name(), %hand, "joint pose unavailable");
                HandJointRecord::UNTRACKED
            }
            Err(error) => {
                warn!(joint = joint.name(), %hand, %error, "failed to resolve joint pose");
                HandJointRecord::UNTRACKED
            }
        };
        cursor = record.encode(buffer, cursor);
    }
    debug_assert_eq!(cursor, offset + HAND_DATA_SIZE);
    cursor
}

/// All 25 joints of one decoded hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandData {
    pub joints: [HandJointRecord; HAND_JOINT_COUNT],
}

impl HandData {
    pub fn decode(buffer: &[u8], offset: usize) -> Self {
        let mut joints = [HandJointRecord::UNTRACKED; HAND_JOINT_COUNT];
        let mut cursor = offset;
        for joint in &mut joints {
            let (record, next) = HandJointRecord::decode(buffer, cursor);
            *joint = record;
            cursor = next;
        }
        Self { joints }
    }

    pub fn joint(&self, joint: HandJoint) -> &HandJointRecord {
        &self.joints[joint.index()]
    }
}

/// Extracts one hand from a frame hand buffer.
///
/// Returns `None` when the buffer is short, the handedness is unknown, or the
/// hand's detection flag is clear.
pub fn read_hand(buffer: &[u8], handedness: Handedness) -> Option<HandData> {
    if buffer.len() < HAND_BUFFER_SIZE {
        return None;
    }
    let (offset, flag_offset) = match handedness {
        Handedness::Left => (LEFT_HAND_OFFSET, HAND_FLAGS_OFFSET),
        Handedness::Right => (RIGHT_HAND_OFFSET, HAND_FLAGS_OFFSET + I32_SIZE),
        Handedness::Unknown => return None,
    };
    let (detected, _) = decode_i32(buffer, flag_offset);
    (detected != 0).then(|| HandData::decode(buffer, offset))
}
