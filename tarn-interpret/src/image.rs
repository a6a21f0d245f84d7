//! Decoding image XObjects into pixel payloads.
//!
//! Only the device colour spaces at 1 and 8 bits per component are decoded
//! here; compressed formats (DCT, JBIG2, CCITT, JPX) arrive through stream
//! filters before this code sees them, or not at all.

use crate::color::ColorSpace;
use tarn_syntax::object::name::keys;
use tarn_syntax::object::Dict;
use tarn_syntax::Document;

/// Decoded pixels, top row first.
#[derive(Debug, Clone)]
pub enum ImageData {
    /// Three bytes per pixel.
    Rgb(Vec<u8>),
    /// One byte per pixel.
    Gray(Vec<u8>),
    /// A stencil mask: one coverage byte per pixel, 255 where paint goes.
    Coverage(Vec<u8>),
}

/// An image ready for the device.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: ImageData,
    /// Per-pixel alpha from an attached soft mask.
    pub alpha: Option<Vec<u8>>,
    pub interpolate: bool,
}

impl Image {
    pub fn is_mask(&self) -> bool {
        matches!(self.data, ImageData::Coverage(_))
    }
}

/// Decode an image's pixels from its dictionary and decoded stream bytes.
pub fn load_image(doc: &Document, dict: &Dict, data: &[u8]) -> Option<Image> {
    let width = dict.get(keys::WIDTH).as_int().max(0) as u32;
    let height = dict.get(keys::HEIGHT).as_int().max(0) as u32;

    if width == 0 || height == 0 || width as u64 * height as u64 > 1 << 28 {
        log::warn!("image has unusable dimensions {width}x{height}");
        return None;
    }

    let interpolate = dict.get(keys::INTERPOLATE).as_bool();
    let is_mask = dict.get(keys::IMAGE_MASK).as_bool();

    let decode = dict
        .get(keys::DECODE)
        .as_array()
        .map(|a| a.to_floats());

    if is_mask {
        let inverted = decode
            .as_ref()
            .is_some_and(|d| d.first().copied().unwrap_or(0.0) > 0.5);

        return Some(Image {
            width,
            height,
            data: ImageData::Coverage(unpack_stencil(data, width, height, inverted)?),
            alpha: None,
            interpolate,
        });
    }

    let bpc = dict.get(keys::BITS_PER_COMPONENT).as_int();
    let space = ColorSpace::from_value(&dict.get(keys::COLORSPACE));

    let pixels = width as usize * height as usize;

    let image_data = match (space, bpc) {
        (ColorSpace::DeviceGray, 8) => {
            let mut out = data.to_vec();
            out.resize(pixels, 0);
            ImageData::Gray(out)
        }
        (ColorSpace::DeviceGray, 1) => {
            let unpacked = unpack_stencil(data, width, height, true)?;
            ImageData::Gray(unpacked)
        }
        (ColorSpace::DeviceRgb | ColorSpace::DeviceBgr, 8) => {
            let mut out = data.to_vec();
            out.resize(pixels * 3, 0);

            if space == ColorSpace::DeviceBgr {
                for px in out.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
            }

            ImageData::Rgb(out)
        }
        (ColorSpace::DeviceCmyk, 8) => {
            // Convert to the destination space before any scaling happens.
            let mut out = Vec::with_capacity(pixels * 3);

            for px in data.chunks_exact(4).take(pixels) {
                let rgb = ColorSpace::DeviceCmyk.to_rgb(&[
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                    px[3] as f32 / 255.0,
                ]);
                out.extend(rgb.iter().map(|c| (c * 255.0 + 0.5) as u8));
            }

            out.resize(pixels * 3, 0);
            ImageData::Rgb(out)
        }
        (space, bpc) => {
            log::warn!("unsupported image format ({space:?} at {bpc} bpc)");
            return None;
        }
    };

    // An attached soft mask supplies per-pixel alpha at its own size;
    // mismatched sizes are resampled nearest here.
    let alpha = dict
        .get_raw(keys::SMASK)
        .and_then(|v| v.as_ref_value())
        .and_then(|r| load_soft_mask_alpha(doc, r.num, width, height));

    Some(Image {
        width,
        height,
        data: image_data,
        alpha,
        interpolate,
    })
}

fn load_soft_mask_alpha(doc: &Document, num: i32, width: u32, height: u32) -> Option<Vec<u8>> {
    let dict = doc.load_object(num, 0).ok()?.as_dict()?;
    let data = doc.load_stream(num).ok()?;

    let mask = load_image(doc, &dict, &data)?;

    let source = match &mask.data {
        ImageData::Gray(g) => g,
        ImageData::Coverage(c) => c,
        ImageData::Rgb(_) => {
            log::warn!("soft mask image is not grayscale");
            return None;
        }
    };

    let mut out = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height {
        let sy = (y as u64 * mask.height as u64 / height as u64) as usize;
        for x in 0..width {
            let sx = (x as u64 * mask.width as u64 / width as u64) as usize;
            out.push(
                source
                    .get(sy * mask.width as usize + sx)
                    .copied()
                    .unwrap_or(255),
            );
        }
    }

    Some(out)
}

/// Expand 1-bit rows into a byte per pixel. `set_paints` chooses whether a
/// set bit produces 255.
fn unpack_stencil(data: &[u8], width: u32, height: u32, set_paints: bool) -> Option<Vec<u8>> {
    let row_bytes = (width as usize).div_ceil(8);
    let mut out = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height as usize {
        let row = data.get(y * row_bytes..(y + 1) * row_bytes)?;

        for x in 0..width as usize {
            let bit = (row[x / 8] >> (7 - x % 8)) & 1;
            let on = (bit == 1) == set_paints;
            out.push(if on { 255 } else { 0 });
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_unpacking_msb_first() {
        // 4x2, rows 0b1010_0000 and 0b0101_0000.
        let out = unpack_stencil(&[0b1010_0000, 0b0101_0000], 4, 2, true).unwrap();
        assert_eq!(out, vec![255, 0, 255, 0, 0, 255, 0, 255]);

        let inverted = unpack_stencil(&[0b1010_0000, 0b0101_0000], 4, 2, false).unwrap();
        assert_eq!(inverted, vec![0, 255, 0, 255, 255, 0, 255, 0]);
    }

    #[test]
    fn truncated_stencil_is_rejected() {
        assert!(unpack_stencil(&[0xff], 4, 2, true).is_none());
    }
}
