//! Device colour spaces and colours.

use smallvec::{smallvec, SmallVec};
use tarn_syntax::object::name::keys;
use tarn_syntax::object::Value;

/// The device colour spaces the core composites in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceBgr,
    DeviceCmyk,
}

impl ColorSpace {
    /// The number of components, excluding alpha.
    pub fn n(&self) -> usize {
        match self {
            ColorSpace::DeviceGray => 1,
            ColorSpace::DeviceRgb | ColorSpace::DeviceBgr => 3,
            ColorSpace::DeviceCmyk => 4,
        }
    }

    /// Interpret a colour-space operand. Unknown spaces fall back to gray
    /// with a warning, keeping the accessor total.
    pub fn from_value(value: &Value) -> ColorSpace {
        let name = match value.resolve() {
            Value::Name(n) => n,
            Value::Array(a) => a.get(0).as_name(),
            _ => return ColorSpace::DeviceGray,
        };

        match &*name {
            n if n == keys::DEVICE_GRAY || n == b"G" || n == b"CalGray" => ColorSpace::DeviceGray,
            n if n == keys::DEVICE_RGB || n == b"RGB" || n == b"CalRGB" => ColorSpace::DeviceRgb,
            n if n == keys::DEVICE_CMYK || n == b"CMYK" => ColorSpace::DeviceCmyk,
            other => {
                log::warn!(
                    "unsupported color space {}; substituting gray",
                    String::from_utf8_lossy(other)
                );
                ColorSpace::DeviceGray
            }
        }
    }

    /// Convert components in this space to RGB in [0, 1].
    pub fn to_rgb(&self, components: &[f32]) -> [f32; 3] {
        let c = |i: usize| components.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);

        match self {
            ColorSpace::DeviceGray => [c(0), c(0), c(0)],
            ColorSpace::DeviceRgb => [c(0), c(1), c(2)],
            ColorSpace::DeviceBgr => [c(2), c(1), c(0)],
            ColorSpace::DeviceCmyk => {
                let (cy, m, y, k) = (c(0), c(1), c(2), c(3));
                [
                    (1.0 - (cy + k).min(1.0)),
                    (1.0 - (m + k).min(1.0)),
                    (1.0 - (y + k).min(1.0)),
                ]
            }
        }
    }
}

/// A colour with its space, components and alpha.
#[derive(Debug, Clone)]
pub struct Color {
    pub space: ColorSpace,
    pub components: SmallVec<[f32; 4]>,
    pub alpha: f32,
}

impl Color {
    pub fn gray(g: f32) -> Self {
        Self {
            space: ColorSpace::DeviceGray,
            components: smallvec![g],
            alpha: 1.0,
        }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            space: ColorSpace::DeviceRgb,
            components: smallvec![r, g, b],
            alpha: 1.0,
        }
    }

    pub fn black() -> Self {
        Self::gray(0.0)
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn to_rgb(&self) -> [f32; 3] {
        self.space.to_rgb(&self.components)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmyk_to_rgb() {
        let rgb = ColorSpace::DeviceCmyk.to_rgb(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rgb, [1.0, 1.0, 1.0]);

        let rgb = ColorSpace::DeviceCmyk.to_rgb(&[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(rgb, [0.0, 0.0, 0.0]);

        let rgb = ColorSpace::DeviceCmyk.to_rgb(&[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(rgb, [0.0, 1.0, 1.0]);
    }

    #[test]
    fn bgr_swaps_channels() {
        let rgb = ColorSpace::DeviceBgr.to_rgb(&[1.0, 0.5, 0.0]);
        assert_eq!(rgb, [0.0, 0.5, 1.0]);
    }

    #[test]
    fn gray_replicates() {
        assert_eq!(Color::gray(0.5).to_rgb(), [0.5, 0.5, 0.5]);
    }

    #[test]
    fn missing_components_read_as_zero() {
        assert_eq!(ColorSpace::DeviceRgb.to_rgb(&[1.0]), [1.0, 0.0, 0.0]);
    }
}
