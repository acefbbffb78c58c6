//! Pixel value conversion between channel types.
//!
//! Conversions go through `f32`. Integer types are treated as normalized:
//! the full positive range maps to `[0.0, 1.0]` (signed types map their
//! negative range to `[-1.0, 0.0)`), so converting `u8` 255 to float yields
//! 1.0 and converting back is lossless. Identity conversions degenerate to
//! a plain copy.

use crate::format::PixelType;
use half::f16;

/// Reads one value at `src[idx]` as a normalized f32.
#[inline]
pub fn value_to_f32(ty: PixelType, src: &[u8], idx: usize) -> f32 {
    let b = &src[idx * ty.size()..];
    match ty {
        PixelType::UInt8 => b[0] as f32 / u8::MAX as f32,
        PixelType::Int8 => (b[0] as i8 as f32 / i8::MAX as f32).max(-1.0),
        PixelType::UInt16 => {
            u16::from_ne_bytes([b[0], b[1]]) as f32 / u16::MAX as f32
        }
        PixelType::Int16 => {
            (i16::from_ne_bytes([b[0], b[1]]) as f32 / i16::MAX as f32).max(-1.0)
        }
        PixelType::UInt32 => {
            u32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 / u32::MAX as f32
        }
        PixelType::Int32 => {
            (i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 / i32::MAX as f32).max(-1.0)
        }
        PixelType::Half => f16::from_ne_bytes([b[0], b[1]]).to_f32(),
        PixelType::Float => f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
        PixelType::Double => {
            f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
        }
    }
}

/// Writes one normalized f32 into `dst[idx]` at the given type.
#[inline]
pub fn f32_to_value(ty: PixelType, v: f32, dst: &mut [u8], idx: usize) {
    let b = &mut dst[idx * ty.size()..];
    match ty {
        PixelType::UInt8 => {
            b[0] = (v.clamp(0.0, 1.0) * u8::MAX as f32).round() as u8;
        }
        PixelType::Int8 => {
            b[0] = ((v.clamp(-1.0, 1.0) * i8::MAX as f32).round() as i8) as u8;
        }
        PixelType::UInt16 => {
            let q = (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
            b[..2].copy_from_slice(&q.to_ne_bytes());
        }
        PixelType::Int16 => {
            let q = (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            b[..2].copy_from_slice(&q.to_ne_bytes());
        }
        PixelType::UInt32 => {
            let q = (v.clamp(0.0, 1.0) as f64 * u32::MAX as f64).round() as u32;
            b[..4].copy_from_slice(&q.to_ne_bytes());
        }
        PixelType::Int32 => {
            let q = (v.clamp(-1.0, 1.0) as f64 * i32::MAX as f64).round() as i32;
            b[..4].copy_from_slice(&q.to_ne_bytes());
        }
        PixelType::Half => {
            b[..2].copy_from_slice(&f16::from_f32(v).to_ne_bytes());
        }
        PixelType::Float => {
            b[..4].copy_from_slice(&v.to_ne_bytes());
        }
        PixelType::Double => {
            b[..8].copy_from_slice(&(v as f64).to_ne_bytes());
        }
    }
}

/// Converts `count` values from `src` (at `src_ty`) into `dst` (at `dst_ty`).
///
/// `src` must hold at least `count * src_ty.size()` bytes and `dst` at least
/// `count * dst_ty.size()` bytes. Same-type conversion is a straight copy.
pub fn convert_values(src_ty: PixelType, src: &[u8], dst_ty: PixelType, dst: &mut [u8], count: usize) {
    if src_ty == dst_ty {
        dst[..count * dst_ty.size()].copy_from_slice(&src[..count * src_ty.size()]);
        return;
    }
    for i in 0..count {
        let v = value_to_f32(src_ty, src, i);
        f32_to_value(dst_ty, v, dst, i);
    }
}

/// Converts `count` values from a normalized f32 slice into `dst`.
pub fn f32_slice_to_values(src: &[f32], dst_ty: PixelType, dst: &mut [u8]) {
    for (i, &v) in src.iter().enumerate() {
        f32_to_value(dst_ty, v, dst, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_roundtrip() {
        let src: Vec<u8> = (0..=255).collect();
        let mut mid = vec![0u8; 256 * 4];
        convert_values(PixelType::UInt8, &src, PixelType::Float, &mut mid, 256);
        let mut back = vec![0u8; 256];
        convert_values(PixelType::Float, &mid, PixelType::UInt8, &mut back, 256);
        assert_eq!(src, back);
    }

    #[test]
    fn u8_normalizes() {
        let src = [0u8, 128, 255];
        let mut dst = vec![0u8; 3 * 4];
        convert_values(PixelType::UInt8, &src, PixelType::Float, &mut dst, 3);
        let f: Vec<f32> = dst
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(f[0], 0.0);
        assert!((f[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(f[2], 1.0);
    }

    #[test]
    fn identity_is_copy() {
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 8];
        convert_values(PixelType::UInt16, &src, PixelType::UInt16, &mut dst, 4);
        assert_eq!(src, dst);
    }

    #[test]
    fn half_conversion() {
        let v = half::f16::from_f32(0.5);
        let src = v.to_ne_bytes();
        let mut dst = [0u8; 4];
        convert_values(PixelType::Half, &src, PixelType::Float, &mut dst, 1);
        let out = f32::from_ne_bytes(dst);
        assert!((out - 0.5).abs() < 1e-3);
    }

    #[test]
    fn float_clamps_into_u8() {
        let vals = [-0.5f32, 1.5];
        let src: Vec<u8> = vals.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut dst = [9u8; 2];
        convert_values(PixelType::Float, &src, PixelType::UInt8, &mut dst, 2);
        assert_eq!(dst, [0, 255]);
    }
}
