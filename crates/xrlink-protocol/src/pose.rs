//! Pose primitives reported by the host and the view / input-pose records
//! derived from them.

use crate::codec::{
    decode_i32, decode_matrix4x4, decode_quat, decode_vec3, encode_i32, encode_matrix4x4,
    encode_quat, encode_vec3,
};
use crate::ids::SpaceId;
use crate::layout::{INPUT_POSE_SIZE, VIEW_RECORD_SIZE};
use crate::mode::ReferenceSpaceType;
use serde::{Deserialize, Serialize};

pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
pub const IDENTITY_QUAT: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Position, orientation and the equivalent column-major matrix.
///
/// The host reports all three; the bridge copies whichever the wire record
/// needs and never recomputes one from another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub matrix: [f32; 16],
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            orientation: IDENTITY_QUAT,
            matrix: IDENTITY_MATRIX,
        }
    }

    /// Builds the transform the way a host would, deriving the matrix from a
    /// unit quaternion and a translation.
    pub fn from_position_orientation(position: [f32; 3], orientation: [f32; 4]) -> Self {
        let [x, y, z, w] = orientation;
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        let matrix = [
            1.0 - 2.0 * (yy + zz),
            2.0 * (xy + wz),
            2.0 * (xz - wy),
            0.0,
            2.0 * (xy - wz),
            1.0 - 2.0 * (xx + zz),
            2.0 * (yz + wx),
            0.0,
            2.0 * (xz + wy),
            2.0 * (yz - wx),
            1.0 - 2.0 * (xx + yy),
            0.0,
            position[0],
            position[1],
            position[2],
            1.0,
        ];
        Self {
            position,
            orientation,
            matrix,
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    Left,
    Right,
    /// Monoscopic view (inline sessions).
    None,
}

impl Eye {
    /// Fixed slot in the frame views buffer. A monoscopic view fills slot 0.
    pub fn slot(self) -> usize {
        match self {
            Self::Left | Self::None => 0,
            Self::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub eye: Eye,
    pub transform: RigidTransform,
    pub projection_matrix: [f32; 16],
}

/// Head pose and per-eye views for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerPose {
    pub transform: RigidTransform,
    pub views: Vec<View>,
    #[serde(default)]
    pub emulated_position: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub transform: RigidTransform,
    #[serde(default)]
    pub emulated_position: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub transform: RigidTransform,
    /// Absent when the host does not report a radius.
    #[serde(default)]
    pub radius: Option<f32>,
}

/// A coordinate system established by the host for the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpace {
    pub id: SpaceId,
    pub kind: ReferenceSpaceType,
}

/// Decoded form of one 172-byte view record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRecord {
    pub view_matrix: [f32; 16],
    pub projection_matrix: [f32; 16],
    pub viewport: Viewport,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

/// Writes a view record: transform matrix, projection matrix, viewport,
/// position, orientation.
pub fn encode_view(buffer: &mut [u8], offset: usize, view: &View, viewport: Viewport) -> usize {
    let offset = encode_matrix4x4(buffer, offset, &view.transform.matrix);
    let offset = encode_matrix4x4(buffer, offset, &view.projection_matrix);
    let offset = encode_i32(buffer, offset, viewport.x);
    let offset = encode_i32(buffer, offset, viewport.y);
    let offset = encode_i32(buffer, offset, viewport.width);
    let offset = encode_i32(buffer, offset, viewport.height);
    let offset = encode_vec3(buffer, offset, view.transform.position);
    encode_quat(buffer, offset, view.transform.orientation)
}

impl ViewRecord {
    pub fn decode(buffer: &[u8], offset: usize) -> Self {
        let (view_matrix, cursor) = decode_matrix4x4(buffer, offset);
        let (projection_matrix, cursor) = decode_matrix4x4(buffer, cursor);
        let (x, cursor) = decode_i32(buffer, cursor);
        let (y, cursor) = decode_i32(buffer, cursor);
        let (width, cursor) = decode_i32(buffer, cursor);
        let (height, cursor) = decode_i32(buffer, cursor);
        let (position, cursor) = decode_vec3(buffer, cursor);
        let (orientation, cursor) = decode_quat(buffer, cursor);
        debug_assert_eq!(cursor, offset + VIEW_RECORD_SIZE);
        Self {
            view_matrix,
            projection_matrix,
            viewport: Viewport {
                x,
                y,
                width,
                height,
            },
            position,
            orientation,
        }
    }
}

/// Pose of an input source as written by `get_input_pose`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPose {
    pub target_ray: [f32; 16],
    pub grip: [f32; 16],
    pub emulated_position: bool,
}

pub fn encode_input_pose(buffer: &mut [u8], offset: usize, pose: &InputPose) -> usize {
    let offset = encode_matrix4x4(buffer, offset, &pose.target_ray);
    let offset = encode_matrix4x4(buffer, offset, &pose.grip);
    encode_i32(buffer, offset, i32::from(pose.emulated_position))
}

impl InputPose {
    pub fn decode(buffer: &[u8], offset: usize) -> Self {
        let (target_ray, cursor) = decode_matrix4x4(buffer, offset);
        let (grip, cursor) = decode_matrix4x4(buffer, cursor);
        let (emulated, cursor) = decode_i32(buffer, cursor);
        debug_assert_eq!(cursor, offset + INPUT_POSE_SIZE);
        Self {
            target_ray,
            grip,
            emulated_position: emulated != 0,
        }
    }
}
