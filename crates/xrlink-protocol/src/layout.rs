//! Byte layouts of every record that crosses the native boundary.
//!
//! All fields are little-endian and 4-byte aligned.

pub const F32_SIZE: usize = 4;
pub const I32_SIZE: usize = 4;

/// `[x, y, z]` as f32.
pub const VEC3_SIZE: usize = 3 * F32_SIZE;
/// `[x, y, z, w]` as f32.
pub const QUAT_SIZE: usize = 4 * F32_SIZE;
/// 16 × f32, column-major as reported by the host.
pub const MATRIX4_SIZE: usize = 16 * F32_SIZE;
/// `[x, y, width, height]` as i32.
pub const VIEWPORT_SIZE: usize = 4 * I32_SIZE;

/// view matrix + projection matrix + viewport + position + orientation.
pub const VIEW_RECORD_SIZE: usize =
    MATRIX4_SIZE + MATRIX4_SIZE + VIEWPORT_SIZE + VEC3_SIZE + QUAT_SIZE;
pub const VIEW_SLOTS: usize = 2;
/// Offset of the trailing model matrix inside the frame views buffer.
pub const MODEL_MATRIX_OFFSET: usize = VIEW_SLOTS * VIEW_RECORD_SIZE;
/// Two view records followed by the model matrix.
pub const FRAME_VIEWS_SIZE: usize = MODEL_MATRIX_OFFSET + MATRIX4_SIZE;

/// id + handedness + target ray mode + has-hand + has-controller.
pub const INPUT_SOURCE_DESCRIPTOR_SIZE: usize = 5 * I32_SIZE;

/// position + orientation + radius.
pub const HAND_JOINT_RECORD_SIZE: usize = VEC3_SIZE + QUAT_SIZE + F32_SIZE;
pub const HAND_JOINT_COUNT: usize = 25;
pub const HAND_DATA_SIZE: usize = HAND_JOINT_COUNT * HAND_JOINT_RECORD_SIZE;
pub const LEFT_HAND_OFFSET: usize = 0;
pub const RIGHT_HAND_OFFSET: usize = HAND_DATA_SIZE;
/// Offset of the two i32 detection flags after both hands.
pub const HAND_FLAGS_OFFSET: usize = 2 * HAND_DATA_SIZE;
pub const HAND_BUFFER_SIZE: usize = HAND_FLAGS_OFFSET + 2 * I32_SIZE;

/// target-ray matrix + grip matrix + emulated-position flag.
pub const INPUT_POSE_SIZE: usize = MATRIX4_SIZE + MATRIX4_SIZE + I32_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_native_structs() {
        assert_eq!(VEC3_SIZE, 12);
        assert_eq!(MATRIX4_SIZE, 64);
        assert_eq!(VIEW_RECORD_SIZE, 172);
        assert_eq!(FRAME_VIEWS_SIZE, 2 * 172 + 64);
        assert_eq!(INPUT_SOURCE_DESCRIPTOR_SIZE, 20);
        assert_eq!(HAND_JOINT_RECORD_SIZE, 32);
        assert_eq!(HAND_DATA_SIZE, 800);
        assert_eq!(RIGHT_HAND_OFFSET, 800);
        assert_eq!(HAND_FLAGS_OFFSET, 1600);
        assert_eq!(HAND_BUFFER_SIZE, 1608);
        assert_eq!(INPUT_POSE_SIZE, 132);
    }
}
