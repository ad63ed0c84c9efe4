//! Compact vertex attribute encodings shared with the shaders.

use ultraviolet::{Vec3, Vec4};

/// Encoding of a vector that has no direction.
pub const INVALID_UNIT_VEC: u32 = 0x8000_8000;

/// Octahedral encoding of a unit vector into two signed 16 bit values.
pub fn compress_unit_vec(v: Vec3) -> u32 {
    let sum = v.x.abs() + v.y.abs() + v.z.abs();
    if !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()) || sum == 0.0 {
        return INVALID_UNIT_VEC;
    }

    let d = 32767.0 / sum;
    let mut x = (v.x * d).round() as i32;
    let mut y = (v.y * d).round() as i32;
    if v.z < 0.0 {
        (x, y) = fold(x, y);
    }

    ((y as u32) << 16) | (x as u32 & 0xFFFF)
}

/// Inverse of [`compress_unit_vec`]. `None` for [`INVALID_UNIT_VEC`].
pub fn decompress_unit_vec(packed: u32) -> Option<Vec3> {
    if packed == INVALID_UNIT_VEC {
        return None;
    }

    let mut x = ((packed << 16) as i32) >> 16;
    let mut y = (packed as i32) >> 16;
    let z = 32767 - x.abs() - y.abs();
    if z < 0 {
        (x, y) = fold(x, y);
    }

    Some(Vec3::new(x as f32, y as f32, z as f32).normalized())
}

// Reflects the lower hemisphere over the diagonals of the octahedron
fn fold(x: i32, y: i32) -> (i32, i32) {
    let mask_x = x >> 31;
    let mask_y = y >> 31;
    let tmp = 32767 + mask_x + mask_y;
    ((tmp - (y ^ mask_y)) ^ mask_x, (tmp - (x ^ mask_x)) ^ mask_y)
}

/// Same as GLSL `packUnorm4x8`, x ends up in the lowest byte.
pub fn pack_unorm4x8(v: Vec4) -> u32 {
    let pack = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    pack(v.x) | (pack(v.y) << 8) | (pack(v.z) << 16) | (pack(v.w) << 24)
}

/// Stores the tangent handedness in the least significant bit of a texture coordinate.
pub fn encode_handedness(value: f32, handedness: f32) -> f32 {
    let mut bits = value.to_bits();
    if handedness > 0.0 {
        bits |= 1;
    } else {
        bits &= !1;
    }
    f32::from_bits(bits)
}

pub fn decode_handedness(value: f32) -> f32 {
    if value.to_bits() & 1 == 1 {
        1.0
    } else {
        -1.0
    }
}
