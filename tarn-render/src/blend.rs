//! Compositing: span paints, pixmap paints and the group blend.
//!
//! All pixel data is premultiplied. The plain paints implement source-over;
//! `blend_pixmap` implements the transparency-group composite keyed by
//! (isolated, knockout handled by the caller, blend mode).

use crate::pixmap::Pixmap;
use crate::raster::CoverageMask;
use tarn_interpret::BlendMode;
use tarn_syntax::geom::IRect;

/// Premultiply a colour with its alpha into pixmap channel order.
pub fn premultiply(rgb: [f32; 3], alpha: f32, n: usize) -> [u8; 4] {
    let a = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    let px = |c: f32| ((c.clamp(0.0, 1.0) * alpha.clamp(0.0, 1.0)) * 255.0 + 0.5) as u8;

    match n {
        1 => [a, 0, 0, 0],
        2 => {
            // Gray: luma from the usual weights.
            let luma = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
            [px(luma), a, 0, 0]
        }
        _ => [px(rgb[0]), px(rgb[1]), px(rgb[2]), a],
    }
}

#[inline]
fn mul255(a: u8, b: u8) -> u8 {
    ((a as u32 * b as u32 + 127) / 255) as u8
}

/// Composite a solid colour through a coverage mask onto a pixmap.
pub fn paint_mask_color(dst: &mut Pixmap, mask: &CoverageMask, color: &[u8; 4]) {
    let n = dst.n();
    let region = mask.bbox.intersect(&dst.bbox());

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let cov = mask.coverage_at(x, y);
            if cov == 0 {
                continue;
            }

            let Some(offset) = dst.offset_of(x, y) else {
                continue;
            };

            let px = &mut dst.data_mut()[offset..offset + n];
            for (c, src) in px.iter_mut().zip(color.iter()) {
                let s = mul255(*src, cov);
                *c = s + mul255(*c, 255 - mul255(color[n - 1], cov));
            }
        }
    }
}

/// Source-over one pixmap onto another at matching device coordinates,
/// scaled by `alpha` (0..=255).
pub fn paint_pixmap(dst: &mut Pixmap, src: &Pixmap, alpha: u8) {
    paint_pixmap_clipped(dst, src, alpha, &IRect::INFINITE);
}

/// Source-over, restricted to `clip`.
pub fn paint_pixmap_clipped(dst: &mut Pixmap, src: &Pixmap, alpha: u8, clip: &IRect) {
    debug_assert_eq!(dst.format, src.format);

    let n = dst.n();
    let region = dst.bbox().intersect(&src.bbox()).intersect(clip);

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let (Some(doff), Some(soff)) = (dst.offset_of(x, y), src.offset_of(x, y)) else {
                continue;
            };

            let sa = mul255(src.data()[soff + n - 1], alpha);
            if sa == 0 && src.data()[soff..soff + n].iter().all(|c| *c == 0) {
                continue;
            }

            for c in 0..n {
                let s = mul255(src.data()[soff + c], alpha);
                let d = dst.data_mut();
                d[doff + c] = s + mul255(d[doff + c], 255 - sa);
            }
        }
    }
}

/// Composite `src` onto `dst` through a single-channel mask pixmap.
pub fn paint_pixmap_with_mask(dst: &mut Pixmap, src: &Pixmap, mask: &Pixmap) {
    debug_assert_eq!(dst.format, src.format);

    let n = dst.n();
    let region = dst
        .bbox()
        .intersect(&src.bbox())
        .intersect(&mask.bbox());

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let (Some(doff), Some(soff), Some(moff)) = (
                dst.offset_of(x, y),
                src.offset_of(x, y),
                mask.offset_of(x, y),
            ) else {
                continue;
            };

            let m = mask.data()[moff];
            if m == 0 {
                continue;
            }

            let sa = mul255(src.data()[soff + n - 1], m);

            for c in 0..n {
                let s = mul255(src.data()[soff + c], m);
                let d = dst.data_mut();
                d[doff + c] = s + mul255(d[doff + c], 255 - sa);
            }
        }
    }
}

/// Composite a solid colour through an alpha-pixmap mask translated by
/// (dx, dy); the glyph paint.
pub fn paint_alpha_mask_color(
    dst: &mut Pixmap,
    mask: &Pixmap,
    dx: i32,
    dy: i32,
    color: &[u8; 4],
    clip: &IRect,
) {
    let n = dst.n();
    let region = dst
        .bbox()
        .intersect(&mask.bbox().translate(dx, dy))
        .intersect(clip);

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let (Some(doff), Some(moff)) = (dst.offset_of(x, y), mask.offset_of(x - dx, y - dy))
            else {
                continue;
            };

            let cov = mask.data()[moff];
            if cov == 0 {
                continue;
            }

            let sa = mul255(color[n - 1], cov);
            let d = dst.data_mut();

            for c in 0..n {
                let s = mul255(color[c], cov);
                d[doff + c] = s + mul255(d[doff + c], 255 - sa);
            }
        }
    }
}

/// Composite coverage (scaled by `alpha`) into a single-channel pixmap.
pub fn paint_mask_alpha(dst: &mut Pixmap, mask: &CoverageMask, alpha: u8) {
    let region = mask.bbox.intersect(&dst.bbox());

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let cov = mul255(mask.coverage_at(x, y), alpha);
            if cov == 0 {
                continue;
            }

            if let Some(offset) = dst.offset_of(x, y) {
                let d = dst.data_mut();
                d[offset] = cov + mul255(d[offset], 255 - cov);
            }
        }
    }
}

/// Source-over with `src` translated by (dx, dy), restricted to `clip`.
/// This is how pattern tiles are replayed across the lattice.
pub fn paint_pixmap_shifted(
    dst: &mut Pixmap,
    src: &Pixmap,
    dx: i32,
    dy: i32,
    alpha: u8,
    clip: &IRect,
) {
    debug_assert_eq!(dst.format, src.format);

    let n = dst.n();
    let shifted_src = src.bbox().translate(dx, dy);
    let region = dst.bbox().intersect(&shifted_src).intersect(clip);

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let (Some(doff), Some(soff)) =
                (dst.offset_of(x, y), src.offset_of(x - dx, y - dy))
            else {
                continue;
            };

            let sa = mul255(src.data()[soff + n - 1], alpha);

            for c in 0..n {
                let s = mul255(src.data()[soff + c], alpha);
                let d = dst.data_mut();
                d[doff + c] = s + mul255(d[doff + c], 255 - sa);
            }
        }
    }
}

fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => blend_channel(BlendMode::HardLight, cs, cb),
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
        BlendMode::ColorDodge => {
            if cb == 0.0 {
                0.0
            } else if cs >= 1.0 {
                1.0
            } else {
                (cb / (1.0 - cs)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if cb >= 1.0 {
                1.0
            } else if cs == 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - cb) / cs).min(1.0)
            }
        }
        BlendMode::HardLight => {
            if cs <= 0.5 {
                cb * 2.0 * cs
            } else {
                let cs = 2.0 * cs - 1.0;
                cb + cs - cb * cs
            }
        }
        BlendMode::SoftLight => {
            if cs <= 0.5 {
                cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
            } else {
                let d = if cb <= 0.25 {
                    ((16.0 * cb - 12.0) * cb + 4.0) * cb
                } else {
                    cb.sqrt()
                };
                cb + (2.0 * cs - 1.0) * (d - cb)
            }
        }
        BlendMode::Difference => (cb - cs).abs(),
        BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
    }
}

/// The full transparency-group composite of `src` over `dst`.
///
/// `alpha` scales the group; `shape` (when present) carries the group's
/// coverage, which non-isolated groups need to subtract their backdrop
/// contribution again.
pub fn blend_pixmap(
    dst: &mut Pixmap,
    src: &Pixmap,
    alpha: u8,
    mode: BlendMode,
    isolated: bool,
    shape: Option<&Pixmap>,
) {
    debug_assert_eq!(dst.format, src.format);

    let n = dst.n();
    let region = dst.bbox().intersect(&src.bbox());
    let alpha = alpha as f32 / 255.0;

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let (Some(doff), Some(soff)) = (dst.offset_of(x, y), src.offset_of(x, y)) else {
                continue;
            };

            let shape_cov = shape
                .and_then(|s| s.offset_of(x, y).map(|o| s.data()[o]))
                .map(|v| v as f32 / 255.0);

            let sa_raw = src.data()[soff + n - 1] as f32 / 255.0;
            let ba = dst.data()[doff + n - 1] as f32 / 255.0;

            // Un-composite non-isolated groups: the backdrop was painted
            // into the group at push time and must not count twice.
            let (src_color, sa): (Vec<f32>, f32) = if !isolated {
                let cov = shape_cov.unwrap_or(sa_raw);
                if cov <= 0.0 {
                    continue;
                }

                let mut out = Vec::with_capacity(n - 1);
                for c in 0..n - 1 {
                    let s = src.data()[soff + c] as f32 / 255.0;
                    let b = dst.data()[doff + c] as f32 / 255.0;
                    // Remove the backdrop share, proportionally to how
                    // much of the pixel the group actually painted.
                    out.push(((s - b * (1.0 - cov)) / cov).clamp(0.0, 1.0));
                }
                (out, cov)
            } else {
                let sa = sa_raw;
                if sa <= 0.0 {
                    continue;
                }

                let mut out = Vec::with_capacity(n - 1);
                for c in 0..n - 1 {
                    out.push((src.data()[soff + c] as f32 / 255.0 / sa_raw.max(1e-6)).clamp(0.0, 1.0));
                }
                (out, sa)
            };

            let sa = (sa * alpha).clamp(0.0, 1.0);
            if sa <= 0.0 {
                continue;
            }

            // Blend against the unpremultiplied backdrop.
            for c in 0..n - 1 {
                let b = if ba > 0.0 {
                    (dst.data()[doff + c] as f32 / 255.0 / ba).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let s = src_color[c];

                let mixed = if ba > 0.0 {
                    (1.0 - ba) * s + ba * blend_channel(mode, b, s)
                } else {
                    s
                };

                let out = (1.0 - sa) * (dst.data()[doff + c] as f32 / 255.0) + sa * mixed;
                dst.data_mut()[doff + c] = (out.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
            }

            let out_a = ba + sa - ba * sa;
            dst.data_mut()[doff + n - 1] = (out_a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixmap::PixFormat;

    fn solid(bbox: IRect, rgba: [u8; 4]) -> Pixmap {
        let mut pix = Pixmap::new(bbox, PixFormat::Rgb);
        for px in pix.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        pix
    }

    #[test]
    fn over_paint_on_opaque_background() {
        let mut dst = solid(IRect::new(0, 0, 2, 2), [255, 255, 255, 255]);
        // Half-transparent red, premultiplied.
        let src = solid(IRect::new(0, 0, 2, 2), [128, 0, 0, 128]);

        paint_pixmap(&mut dst, &src, 255);

        let px = &dst.data()[0..4];
        assert_eq!(px[3], 255);
        assert!(px[0] >= 190 && px[0] <= 193, "got {}", px[0]);
        assert!(px[1] >= 126 && px[1] <= 128);
    }

    #[test]
    fn masked_paint_weights_by_mask() {
        let mut dst = solid(IRect::new(0, 0, 1, 1), [0, 0, 0, 255]);
        let src = solid(IRect::new(0, 0, 1, 1), [255, 255, 255, 255]);

        let mut mask = Pixmap::new(IRect::new(0, 0, 1, 1), PixFormat::Alpha);
        mask.data_mut()[0] = 128;

        paint_pixmap_with_mask(&mut dst, &src, &mask);

        assert!(dst.data()[0] >= 127 && dst.data()[0] <= 129);
    }

    #[test]
    fn isolated_normal_group_is_plain_over() {
        // Blending an isolated group with mode Normal and alpha 1 must
        // agree with a plain paint.
        let backdrop = solid(IRect::new(0, 0, 2, 1), [64, 128, 192, 255]);
        let group = solid(IRect::new(0, 0, 2, 1), [100, 50, 0, 200]);

        let mut a = backdrop.clone();
        paint_pixmap(&mut a, &group, 255);

        let mut b = backdrop.clone();
        blend_pixmap(&mut b, &group, 255, BlendMode::Normal, true, None);

        for (x, y) in a.data().iter().zip(b.data().iter()) {
            assert!((*x as i32 - *y as i32).abs() <= 1, "{x} vs {y}");
        }
    }

    #[test]
    fn multiply_darkens() {
        let mut dst = solid(IRect::new(0, 0, 1, 1), [200, 200, 200, 255]);
        let src = solid(IRect::new(0, 0, 1, 1), [200, 200, 200, 255]);

        blend_pixmap(&mut dst, &src, 255, BlendMode::Multiply, true, None);

        // 200/255 squared is about 157.
        assert!((dst.data()[0] as i32 - 157).abs() <= 2, "{}", dst.data()[0]);
    }

    #[test]
    fn blend_channel_edge_cases() {
        assert_eq!(blend_channel(BlendMode::Screen, 1.0, 0.5), 1.0);
        assert_eq!(blend_channel(BlendMode::Darken, 0.3, 0.7), 0.3);
        assert_eq!(blend_channel(BlendMode::Lighten, 0.3, 0.7), 0.7);
        assert_eq!(blend_channel(BlendMode::Difference, 0.3, 0.7), 0.4);
        assert_eq!(blend_channel(BlendMode::ColorDodge, 0.0, 0.5), 0.0);
        assert_eq!(blend_channel(BlendMode::ColorBurn, 1.0, 0.5), 1.0);
    }
}
