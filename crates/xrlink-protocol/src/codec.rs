//! Fixed-layout binary encoders.
//!
//! Every encoder writes at `offset` into a caller-sized buffer and returns the
//! next free offset. Values pass through unvalidated: NaN and infinities are
//! written as-is and range checking belongs to the native consumer. Callers
//! size buffers from [`crate::layout`]; writing past the end is a bug and
//! panics like any out-of-bounds slice access.

use crate::layout::{F32_SIZE, I32_SIZE, MATRIX4_SIZE, QUAT_SIZE, VEC3_SIZE};

#[inline]
pub fn encode_f32(buffer: &mut [u8], offset: usize, value: f32) -> usize {
    buffer[offset..offset + F32_SIZE].copy_from_slice(&value.to_le_bytes());
    offset + F32_SIZE
}

#[inline]
pub fn encode_i32(buffer: &mut [u8], offset: usize, value: i32) -> usize {
    buffer[offset..offset + I32_SIZE].copy_from_slice(&value.to_le_bytes());
    offset + I32_SIZE
}

/// Writes `[x, y, z]` (12 bytes).
pub fn encode_vec3(buffer: &mut [u8], offset: usize, v: [f32; 3]) -> usize {
    v.iter()
        .fold(offset, |offset, component| encode_f32(buffer, offset, *component))
}

/// Writes `[x, y, z, w]` (16 bytes).
pub fn encode_quat(buffer: &mut [u8], offset: usize, q: [f32; 4]) -> usize {
    q.iter()
        .fold(offset, |offset, component| encode_f32(buffer, offset, *component))
}

/// Writes 16 floats (64 bytes) in the host's column-major order, unmodified.
pub fn encode_matrix4x4(buffer: &mut [u8], offset: usize, m: &[f32; 16]) -> usize {
    m.iter()
        .fold(offset, |offset, component| encode_f32(buffer, offset, *component))
}

/// Zero-fills `len` bytes starting at `offset`.
pub fn encode_zeros(buffer: &mut [u8], offset: usize, len: usize) -> usize {
    buffer[offset..offset + len].fill(0);
    offset + len
}

#[inline]
pub fn decode_f32(buffer: &[u8], offset: usize) -> (f32, usize) {
    let mut bytes = [0_u8; F32_SIZE];
    bytes.copy_from_slice(&buffer[offset..offset + F32_SIZE]);
    (f32::from_le_bytes(bytes), offset + F32_SIZE)
}

#[inline]
pub fn decode_i32(buffer: &[u8], offset: usize) -> (i32, usize) {
    let mut bytes = [0_u8; I32_SIZE];
    bytes.copy_from_slice(&buffer[offset..offset + I32_SIZE]);
    (i32::from_le_bytes(bytes), offset + I32_SIZE)
}

fn decode_floats<const N: usize>(buffer: &[u8], offset: usize) -> ([f32; N], usize) {
    let mut out = [0.0_f32; N];
    let mut cursor = offset;
    for slot in &mut out {
        let (value, next) = decode_f32(buffer, cursor);
        *slot = value;
        cursor = next;
    }
    (out, cursor)
}

pub fn decode_vec3(buffer: &[u8], offset: usize) -> ([f32; 3], usize) {
    let decoded = decode_floats::<3>(buffer, offset);
    debug_assert_eq!(decoded.1, offset + VEC3_SIZE);
    decoded
}

pub fn decode_quat(buffer: &[u8], offset: usize) -> ([f32; 4], usize) {
    let decoded = decode_floats::<4>(buffer, offset);
    debug_assert_eq!(decoded.1, offset + QUAT_SIZE);
    decoded
}

pub fn decode_matrix4x4(buffer: &[u8], offset: usize) -> ([f32; 16], usize) {
    let decoded = decode_floats::<16>(buffer, offset);
    debug_assert_eq!(decoded.1, offset + MATRIX4_SIZE);
    decoded
}
