//! Raw ADC space to display pixel space

use crate::sampler::{RawSample, RAW_MAX};
use embedded_graphics_core::geometry::Size;

#[cfg(feature = "with_defmt")]
use defmt::Format;

/// How the raw panel axes map onto the display axes.
///
/// Mirroring flips the raw X axis before the rotation is applied.
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
    Deg0Mirrored,
    Deg90Mirrored,
    Deg180Mirrored,
    Deg270Mirrored,
}

impl Direction {
    pub fn is_mirrored(self) -> bool {
        matches!(
            self,
            Direction::Deg0Mirrored
                | Direction::Deg90Mirrored
                | Direction::Deg180Mirrored
                | Direction::Deg270Mirrored
        )
    }

    /// Whether the raw X axis ends up driving the display Y axis
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Direction::Deg90
                | Direction::Deg270
                | Direction::Deg90Mirrored
                | Direction::Deg270Mirrored
        )
    }

    /// Permutes a raw reading. The result stays within `0..=RAW_MAX`.
    pub fn apply(self, x: u16, y: u16) -> (u16, u16) {
        let (x, y) = (x.min(RAW_MAX), y.min(RAW_MAX));
        let x = if self.is_mirrored() { RAW_MAX - x } else { x };
        match self {
            Direction::Deg0 | Direction::Deg0Mirrored => (x, y),
            Direction::Deg90 | Direction::Deg90Mirrored => (y, RAW_MAX - x),
            Direction::Deg180 | Direction::Deg180Mirrored => (RAW_MAX - x, RAW_MAX - y),
            Direction::Deg270 | Direction::Deg270Mirrored => (RAW_MAX - y, x),
        }
    }
}

/// Per-axis affine map `pixel = scale * raw + offset`.
///
/// The all-zero value is the "uncalibrated" sentinel; mapping through it
/// behaves like the identity.
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CalibrationTransform {
    pub scale_x: f32,
    pub offset_x: f32,
    pub scale_y: f32,
    pub offset_y: f32,
}

impl CalibrationTransform {
    pub const UNCALIBRATED: Self = Self {
        scale_x: 0.0,
        offset_x: 0.0,
        scale_y: 0.0,
        offset_y: 0.0,
    };

    const IDENTITY: Self = Self {
        scale_x: 1.0,
        offset_x: 0.0,
        scale_y: 1.0,
        offset_y: 0.0,
    };

    pub const ENCODED_LEN: usize = 16;

    pub fn is_uncalibrated(&self) -> bool {
        *self == Self::UNCALIBRATED
    }

    /// Non-zero finite scales and finite offsets
    pub fn is_valid(&self) -> bool {
        self.scale_x.is_finite()
            && self.scale_y.is_finite()
            && self.offset_x.is_finite()
            && self.offset_y.is_finite()
            && self.scale_x != 0.0
            && self.scale_y != 0.0
    }

    pub fn map(&self, x: u16, y: u16) -> (f32, f32) {
        let t = if self.is_uncalibrated() {
            &Self::IDENTITY
        } else {
            self
        };
        (
            t.scale_x * f32::from(x) + t.offset_x,
            t.scale_y * f32::from(y) + t.offset_y,
        )
    }

    /// Little-endian `scale_x, offset_x, scale_y, offset_y`
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        for (chunk, v) in out
            .chunks_exact_mut(4)
            .zip([self.scale_x, self.offset_x, self.scale_y, self.offset_y])
        {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        let mut v = [0f32; 4];
        for (out, chunk) in v.iter_mut().zip(bytes.chunks_exact(4)) {
            *out = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self {
            scale_x: v[0],
            offset_x: v[1],
            scale_y: v[2],
            offset_y: v[3],
        }
    }
}

fn clamp_axis(v: f32, len: u32) -> u16 {
    let max = len.saturating_sub(1).min(u32::from(u16::MAX));
    if v.is_nan() || v <= 0.0 {
        0
    } else if v >= max as f32 {
        max as u16
    } else {
        v as u16
    }
}

/// Direction permutation, then the affine map, then a clamp to the screen.
pub fn to_pixel(
    sample: &RawSample,
    transform: &CalibrationTransform,
    direction: Direction,
    screen: Size,
) -> (u16, u16) {
    let (x, y) = direction.apply(sample.x, sample.y);
    let (px, py) = transform.map(x, y);
    (clamp_axis(px, screen.width), clamp_axis(py, screen.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Size = Size::new(320, 240);

    fn raw(x: u16, y: u16) -> RawSample {
        RawSample { x, y, z: 0 }
    }

    #[test]
    fn rotations_permute_raw_axes() {
        assert_eq!(Direction::Deg0.apply(100, 200), (100, 200));
        assert_eq!(Direction::Deg90.apply(100, 200), (200, RAW_MAX - 100));
        assert_eq!(
            Direction::Deg180.apply(100, 200),
            (RAW_MAX - 100, RAW_MAX - 200)
        );
        assert_eq!(Direction::Deg270.apply(100, 200), (RAW_MAX - 200, 100));
        assert_eq!(Direction::Deg0Mirrored.apply(100, 200), (RAW_MAX - 100, 200));
        assert_eq!(Direction::Deg90Mirrored.apply(100, 200), (200, 100));
    }

    #[test]
    fn four_rotations_are_identity() {
        let mut p = (123, 3456);
        for _ in 0..4 {
            p = Direction::Deg90.apply(p.0, p.1);
        }
        assert_eq!(p, (123, 3456));
    }

    #[test]
    fn uncalibrated_is_raw_but_clamped() {
        let t = CalibrationTransform::default();
        assert!(t.is_uncalibrated());
        assert!(!t.is_valid());
        assert_eq!(to_pixel(&raw(100, 50), &t, Direction::Deg0, SCREEN), (100, 50));
        assert_eq!(
            to_pixel(&raw(4000, 4000), &t, Direction::Deg0, SCREEN),
            (319, 239)
        );
    }

    #[test]
    fn out_of_range_results_are_clamped() {
        let t = CalibrationTransform {
            scale_x: -1.0,
            offset_x: 10.0,
            scale_y: 1.0,
            offset_y: 1000.0,
        };
        assert_eq!(to_pixel(&raw(500, 0), &t, Direction::Deg0, SCREEN), (0, 239));

        let nan = CalibrationTransform {
            scale_x: f32::NAN,
            ..t
        };
        assert_eq!(to_pixel(&raw(500, 0), &nan, Direction::Deg0, SCREEN).0, 0);
    }

    #[test]
    fn mapping_is_deterministic() {
        let t = CalibrationTransform {
            scale_x: 0.088,
            offset_x: -16.4,
            scale_y: 0.065,
            offset_y: -9.4,
        };
        let s = raw(2345, 1234);
        let first = to_pixel(&s, &t, Direction::Deg270Mirrored, SCREEN);
        for _ in 0..8 {
            assert_eq!(to_pixel(&s, &t, Direction::Deg270Mirrored, SCREEN), first);
        }
    }

    #[test]
    fn byte_encoding_is_little_endian() {
        let t = CalibrationTransform {
            scale_x: 1.0,
            offset_x: -2.5,
            scale_y: 0.5,
            offset_y: 100.0,
        };
        let bytes = t.to_bytes();
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[12..], &100.0f32.to_le_bytes());
        assert_eq!(CalibrationTransform::from_bytes(&bytes), t);
    }
}
