//! Input sources and the 20-byte input source descriptor.

use crate::codec::{decode_i32, encode_i32};
use crate::ids::{HandId, InputSourceId, SpaceId};
use crate::layout::INPUT_SOURCE_DESCRIPTOR_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handedness {
    #[default]
    Unknown,
    Left,
    Right,
}

impl Handedness {
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::Unknown),
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// How an input source's pointing ray is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetRayMode {
    /// Ray follows the viewer's gaze; also the fallback for unrecognised modes.
    #[default]
    Gaze,
    TrackedPointer,
    Screen,
}

impl TargetRayMode {
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Gaze => 0,
            Self::TrackedPointer => 1,
            Self::Screen => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Gaze),
            1 => Some(Self::TrackedPointer),
            2 => Some(Self::Screen),
            _ => None,
        }
    }
}

/// Live attributes of one tracked controller or hand, as listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSource {
    pub id: InputSourceId,
    #[serde(default)]
    pub handedness: Handedness,
    #[serde(default)]
    pub target_ray_mode: TargetRayMode,
    #[serde(default)]
    pub hand: Option<HandId>,
    #[serde(default)]
    pub has_gamepad: bool,
    #[serde(default)]
    pub target_ray_space: Option<SpaceId>,
    #[serde(default)]
    pub grip_space: Option<SpaceId>,
}

impl InputSource {
    pub fn has_hand(&self) -> bool {
        self.hand.is_some()
    }

    pub fn has_controller(&self) -> bool {
        self.has_gamepad || self.target_ray_space.is_some()
    }
}

/// Decoded form of the 20-byte descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSourceDescriptor {
    pub index: i32,
    pub handedness: Handedness,
    pub target_ray_mode: TargetRayMode,
    pub has_hand: bool,
    pub has_controller: bool,
}

impl InputSourceDescriptor {
    pub fn from_source(source: &InputSource, index: i32) -> Self {
        Self {
            index,
            handedness: source.handedness,
            target_ray_mode: source.target_ray_mode,
            has_hand: source.has_hand(),
            has_controller: source.has_controller(),
        }
    }

    pub fn encode(&self, buffer: &mut [u8], offset: usize) -> usize {
        let offset = encode_i32(buffer, offset, self.index);
        let offset = encode_i32(buffer, offset, self.handedness.as_raw());
        let offset = encode_i32(buffer, offset, self.target_ray_mode.as_raw());
        let offset = encode_i32(buffer, offset, i32::from(self.has_hand));
        encode_i32(buffer, offset, i32::from(self.has_controller))
    }
}

/// Encodes `source` with the caller-assigned positional `index`.
pub fn encode_input_source(
    buffer: &mut [u8],
    offset: usize,
    source: &InputSource,
    index: i32,
) -> usize {
    InputSourceDescriptor::from_source(source, index).encode(buffer, offset)
}

/// Decodes a descriptor; `None` when an enum field holds an unknown code.
pub fn decode_input_source(
    buffer: &[u8],
    offset: usize,
) -> Option<(InputSourceDescriptor, usize)> {
    let (index, cursor) = decode_i32(buffer, offset);
    let (handedness, cursor) = decode_i32(buffer, cursor);
    let (target_ray_mode, cursor) = decode_i32(buffer, cursor);
    let (has_hand, cursor) = decode_i32(buffer, cursor);
    let (has_controller, cursor) = decode_i32(buffer, cursor);
    debug_assert_eq!(cursor, offset + INPUT_SOURCE_DESCRIPTOR_SIZE);
    Some((
        InputSourceDescriptor {
            index,
            handedness: Handedness::from_raw(handedness)?,
            target_ray_mode: TargetRayMode::from_raw(target_ray_mode)?,
            has_hand: has_hand != 0,
            has_controller: has_controller != 0,
        },
        cursor,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(
        handedness: Handedness,
        target_ray_mode: TargetRayMode,
        has_hand: bool,
        has_gamepad: bool,
    ) -> InputSource {
        InputSource {
            id: InputSourceId(42),
            handedness,
            target_ray_mode,
            hand: has_hand.then_some(HandId(1)),
            has_gamepad,
            target_ray_space: None,
            grip_space: None,
        }
    }

    #[test]
    fn descriptor_roundtrips_every_combination() {
        let mut index = 0;
        for handedness in [Handedness::Unknown, Handedness::Left, Handedness::Right] {
            for mode in [
                TargetRayMode::Gaze,
                TargetRayMode::TrackedPointer,
                TargetRayMode::Screen,
            ] {
                for has_hand in [false, true] {
                    for has_controller in [false, true] {
                        let src = source(handedness, mode, has_hand, has_controller);
                        let mut buffer = [0_u8; INPUT_SOURCE_DESCRIPTOR_SIZE];
                        let next = encode_input_source(&mut buffer, 0, &src, index);
                        assert_eq!(next, INPUT_SOURCE_DESCRIPTOR_SIZE);

                        let (decoded, end) = decode_input_source(&buffer, 0).unwrap();
                        assert_eq!(end, INPUT_SOURCE_DESCRIPTOR_SIZE);
                        assert_eq!(decoded.index, index);
                        assert_eq!(decoded.handedness, handedness);
                        assert_eq!(decoded.target_ray_mode, mode);
                        assert_eq!(decoded.has_hand, has_hand);
                        assert_eq!(decoded.has_controller, has_controller);
                        index += 1;
                    }
                }
            }
        }
        assert_eq!(index, 36);
    }

    #[test]
    fn raw_wire_values() {
        let mut src = source(Handedness::Unknown, TargetRayMode::Screen, true, false);
        src.target_ray_space = Some(SpaceId(9));
        let mut buffer = [0_u8; INPUT_SOURCE_DESCRIPTOR_SIZE];
        encode_input_source(&mut buffer, 0, &src, 3);

        let words: Vec<i32> = buffer
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(words, vec![3, -1, 2, 1, 1]);
    }

    #[test]
    fn target_ray_space_counts_as_controller() {
        let mut src = source(Handedness::Left, TargetRayMode::TrackedPointer, false, false);
        assert!(!src.has_controller());
        src.target_ray_space = Some(SpaceId(1));
        assert!(src.has_controller());
    }

    #[test]
    fn decode_rejects_unknown_codes() {
        let mut buffer = [0_u8; INPUT_SOURCE_DESCRIPTOR_SIZE];
        encode_i32(&mut buffer, 4, 7);
        assert!(decode_input_source(&buffer, 0).is_none());
    }
}
