//! Drawing images: resolution selection, resampling and compositing.

use crate::pixmap::Pixmap;
use crate::raster::CoverageMask;
use kurbo::{Affine, Point};
use tarn_interpret::image::{Image, ImageData};
use tarn_syntax::geom::IRect;

/// Fetch one source pixel as premultiplied RGBA.
#[inline]
fn fetch(image: &Image, sx: usize, sy: usize) -> [u8; 4] {
    let w = image.width as usize;
    let index = sy * w + sx;

    let alpha = image
        .alpha
        .as_ref()
        .and_then(|a| a.get(index).copied())
        .unwrap_or(255);

    let mul = |c: u8| ((c as u32 * alpha as u32 + 127) / 255) as u8;

    match &image.data {
        ImageData::Rgb(data) => {
            let p = &data[index * 3..index * 3 + 3];
            [mul(p[0]), mul(p[1]), mul(p[2]), alpha]
        }
        ImageData::Gray(data) => {
            let g = mul(data[index]);
            [g, g, g, alpha]
        }
        ImageData::Coverage(data) => {
            let c = data[index];
            [c, c, c, c]
        }
    }
}

/// Separable box downscale to the target resolution derived from the CTM
/// axis lengths. Wider-than-destination sources shrink before the general
/// transform to save per-pixel arithmetic.
fn downscale(image: &Image, dw: u32, dh: u32) -> (Vec<[u8; 4]>, u32, u32) {
    let sw = image.width;
    let sh = image.height;

    let dw = dw.clamp(1, sw);
    let dh = dh.clamp(1, sh);

    let mut out = Vec::with_capacity(dw as usize * dh as usize);

    for y in 0..dh {
        let y0 = (y as u64 * sh as u64 / dh as u64) as usize;
        let y1 = (((y + 1) as u64 * sh as u64).div_ceil(dh as u64) as usize).max(y0 + 1);

        for x in 0..dw {
            let x0 = (x as u64 * sw as u64 / dw as u64) as usize;
            let x1 = (((x + 1) as u64 * sw as u64).div_ceil(dw as u64) as usize).max(x0 + 1);

            let mut sum = [0u32; 4];
            let mut count = 0u32;

            for sy in y0..y1.min(sh as usize) {
                for sx in x0..x1.min(sw as usize) {
                    let px = fetch(image, sx, sy);
                    for c in 0..4 {
                        sum[c] += px[c] as u32;
                    }
                    count += 1;
                }
            }

            let count = count.max(1);
            out.push([
                (sum[0] / count) as u8,
                (sum[1] / count) as u8,
                (sum[2] / count) as u8,
                (sum[3] / count) as u8,
            ]);
        }
    }

    (out, dw, dh)
}

/// Snap a rectilinear matrix so the image edges land on pixel borders;
/// avoids seams between adjacent tiles of the same image.
fn grid_fit(ctm: Affine) -> Affine {
    let [a, b, c, d, e, f] = ctm.as_coeffs();

    if b != 0.0 || c != 0.0 {
        return ctm;
    }

    let e2 = e.round();
    let f2 = f.round();
    let a2 = (e + a).round() - e2;
    let d2 = (f + d).round() - f2;

    Affine::new([a2, b, c, d2, e2, f2])
}

/// The resolution the CTM asks of the image.
fn target_resolution(ctm: Affine) -> (u32, u32) {
    let [a, b, c, d, _, _] = ctm.as_coeffs();
    let dw = (a * a + b * b).sqrt().ceil().max(1.0) as u32;
    let dh = (c * c + d * d).sqrt().ceil().max(1.0) as u32;
    (dw, dh)
}

fn is_rectilinear(ctm: Affine) -> bool {
    let [a, b, c, d, _, _] = ctm.as_coeffs();
    (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0)
}

/// Paint an image mapped onto the unit square by `ctm`.
pub fn paint_image(
    dst: &mut Pixmap,
    mut shape: Option<&mut Pixmap>,
    image: &Image,
    ctm: Affine,
    alpha: f32,
    scissor: &IRect,
) {
    let ctm = if alpha >= 1.0 && is_rectilinear(ctm) {
        grid_fit(ctm)
    } else {
        ctm
    };

    let device = ctm.transform_rect_bbox(kurbo::Rect::new(0.0, 0.0, 1.0, 1.0));
    let region = IRect::covering(&device)
        .intersect(scissor)
        .intersect(&dst.bbox());

    if region.is_empty() {
        return;
    }

    let Some(inverse) = (ctm.determinant().abs() > 1e-12).then(|| ctm.inverse()) else {
        return;
    };

    let (dw, dh) = target_resolution(ctm);
    let (base, bw, bh) = downscale(image, dw, dh);

    let smooth = image.interpolate || bw < image.width || bh < image.height;
    let a255 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    let n = dst.n();

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);

            if !(0.0..1.0).contains(&p.x) || !(0.0..1.0).contains(&p.y) {
                continue;
            }

            // Image rows run top-down while the unit square's v axis runs
            // bottom-up.
            let fx = p.x * bw as f64;
            let fy = (1.0 - p.y) * bh as f64;

            let px = sample(&base, bw, bh, fx, fy, smooth);

            let sa = (px[3] as u32 * a255 + 127) / 255;
            if sa == 0 {
                continue;
            }

            let Some(offset) = dst.offset_of(x, y) else {
                continue;
            };

            let src = match n {
                1 => [sa as u8, 0, 0, 0],
                2 => {
                    let luma =
                        (px[0] as u32 * 77 + px[1] as u32 * 151 + px[2] as u32 * 28) >> 8;
                    [((luma * a255 + 127) / 255) as u8, sa as u8, 0, 0]
                }
                _ => [
                    ((px[0] as u32 * a255 + 127) / 255) as u8,
                    ((px[1] as u32 * a255 + 127) / 255) as u8,
                    ((px[2] as u32 * a255 + 127) / 255) as u8,
                    sa as u8,
                ],
            };

            let data = dst.data_mut();
            for c in 0..n {
                let d = data[offset + c] as u32;
                data[offset + c] = (src[c] as u32 + (d * (255 - sa) + 127) / 255) as u8;
            }

            if let Some(shape) = shape.as_deref_mut() {
                if let Some(soff) = shape.offset_of(x, y) {
                    let d = shape.data_mut();
                    d[soff] = (sa + (d[soff] as u32 * (255 - sa) + 127) / 255).min(255) as u8;
                }
            }
        }
    }
}

#[inline]
fn sample(base: &[[u8; 4]], w: u32, h: u32, fx: f64, fy: f64, smooth: bool) -> [u8; 4] {
    if !smooth {
        let x = (fx as i64).clamp(0, w as i64 - 1) as usize;
        let y = (fy as i64).clamp(0, h as i64 - 1) as usize;
        return base[y * w as usize + x];
    }

    let x = fx - 0.5;
    let y = fy - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;

    let get = |ix: i64, iy: i64| -> [u8; 4] {
        let ix = ix.clamp(0, w as i64 - 1) as usize;
        let iy = iy.clamp(0, h as i64 - 1) as usize;
        base[iy * w as usize + ix]
    };

    let p00 = get(x0 as i64, y0 as i64);
    let p10 = get(x0 as i64 + 1, y0 as i64);
    let p01 = get(x0 as i64, y0 as i64 + 1);
    let p11 = get(x0 as i64 + 1, y0 as i64 + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 + (p10[c] as f64 - p00[c] as f64) * tx;
        let bottom = p01[c] as f64 + (p11[c] as f64 - p01[c] as f64) * tx;
        out[c] = (top + (bottom - top) * ty + 0.5) as u8;
    }

    out
}

/// Rasterize an image mask (or an image's alpha) as a coverage mask in
/// device space, for masked fills and clips.
pub fn mask_coverage(image: &Image, ctm: Affine, scissor: &IRect) -> CoverageMask {
    let device = ctm.transform_rect_bbox(kurbo::Rect::new(0.0, 0.0, 1.0, 1.0));
    let bbox = IRect::covering(&device).intersect(scissor);

    if bbox.is_empty() {
        return CoverageMask::empty();
    }

    let Some(inverse) = (ctm.determinant().abs() > 1e-12).then(|| ctm.inverse()) else {
        return CoverageMask::empty();
    };

    let width = bbox.width() as usize;
    let mut data = vec![0u8; width * bbox.height() as usize];

    for y in bbox.y0..bbox.y1 {
        for x in bbox.x0..bbox.x1 {
            let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);

            if !(0.0..1.0).contains(&p.x) || !(0.0..1.0).contains(&p.y) {
                continue;
            }

            let sx = (p.x * image.width as f64) as usize;
            let sy = ((1.0 - p.y) * image.height as f64) as usize;
            let px = fetch(image, sx.min(image.width as usize - 1), sy.min(image.height as usize - 1));

            data[(y - bbox.y0) as usize * width + (x - bbox.x0) as usize] = px[3];
        }
    }

    CoverageMask { bbox, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixmap::PixFormat;

    fn checker() -> Image {
        // 2x2: white, black / black, white.
        Image {
            width: 2,
            height: 2,
            data: ImageData::Gray(vec![255, 0, 0, 255]),
            alpha: None,
            interpolate: false,
        }
    }

    #[test]
    fn image_fills_its_unit_square() {
        let mut dst = Pixmap::new(IRect::new(0, 0, 4, 4), PixFormat::Rgb);

        // Map the image onto [0,4)x[0,4).
        paint_image(
            &mut dst,
            None,
            &checker(),
            Affine::scale(4.0),
            1.0,
            &IRect::new(0, 0, 4, 4),
        );

        // Top-left quadrant is image row 0 col 0 = white.
        let off = dst.offset_of(0, 0).unwrap();
        assert_eq!(dst.data()[off], 255);

        // Bottom-left quadrant is image row 1 col 0 = black, opaque.
        let off = dst.offset_of(0, 3).unwrap();
        assert_eq!(dst.data()[off], 0);
        assert_eq!(dst.data()[off + 3], 255);
    }

    #[test]
    fn grid_fit_snaps_translation() {
        let fitted = grid_fit(Affine::new([10.0, 0.0, 0.0, 10.0, 0.3, -0.4]));
        let [a, _, _, d, e, f] = fitted.as_coeffs();
        assert_eq!((e, f), (0.0, -0.0));
        assert_eq!((a, d), (10.0, 10.0));
    }

    #[test]
    fn mask_coverage_respects_scissor() {
        let image = Image {
            width: 1,
            height: 1,
            data: ImageData::Coverage(vec![255]),
            alpha: None,
            interpolate: false,
        };

        let mask = mask_coverage(&image, Affine::scale(10.0), &IRect::new(0, 0, 4, 4));
        assert_eq!(mask.bbox, IRect::new(0, 0, 4, 4));
        assert!(mask.data.iter().all(|c| *c == 255));
    }
}
