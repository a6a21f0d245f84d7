//! Painting shadings: axial/radial pixel fills and Gouraud triangles.

use crate::pixmap::Pixmap;
use kurbo::{Affine, Point};
use tarn_interpret::shading::{MeshTriangle, ShadingKind, Shading, LUT_SIZE};
use tarn_syntax::geom::IRect;

/// Paint a shading into `dst` (and mirror coverage into `shape`), clipped
/// to `scissor`. `ctm` maps shading space to device space. Returns how many
/// triangles were painted before `should_stop` asked to quit.
pub fn paint_shade(
    dst: &mut Pixmap,
    mut shape: Option<&mut Pixmap>,
    shade: &Shading,
    ctm: Affine,
    alpha: f32,
    scissor: &IRect,
    should_stop: &mut dyn FnMut(usize) -> bool,
) {
    let Some(inverse) = invert(ctm) else {
        log::warn!("shading transform is singular");
        return;
    };

    let mut region = scissor.intersect(&dst.bbox());

    // The shading's own bbox clips in shading space.
    if let Some(bbox) = shade.bbox {
        let device = ctm.transform_rect_bbox(bbox);
        region = region.intersect(&IRect::covering(&device));
    }

    if region.is_empty() {
        return;
    }

    match &shade.kind {
        ShadingKind::Axial {
            coords,
            extend,
            lut,
        } => {
            let p0 = Point::new(coords[0] as f64, coords[1] as f64);
            let p1 = Point::new(coords[2] as f64, coords[3] as f64);
            let axis = p1 - p0;
            let len2 = axis.hypot2();

            if len2 <= 0.0 {
                return;
            }

            paint_parametric(dst, shape, region, alpha, |x, y| {
                let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let t = ((p - p0).dot(axis) / len2) as f32;
                param_color(t, *extend, lut)
            });
        }
        ShadingKind::Radial {
            coords,
            extend,
            lut,
        } => {
            let c0 = Point::new(coords[0] as f64, coords[1] as f64);
            let r0 = coords[2] as f64;
            let c1 = Point::new(coords[3] as f64, coords[4] as f64);
            let r1 = coords[5] as f64;

            paint_parametric(dst, shape, region, alpha, |x, y| {
                let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                radial_param(p, c0, r0, c1, r1).and_then(|t| param_color(t, *extend, lut))
            });
        }
        ShadingKind::Mesh { triangles } => {
            for (index, triangle) in triangles.iter().enumerate() {
                paint_triangle(dst, shape.as_deref_mut(), triangle, ctm, alpha, &region);

                // Shading work is abortable in batches.
                if index % 64 == 63 && should_stop(index + 1) {
                    return;
                }
            }
        }
    }
}

fn invert(m: Affine) -> Option<Affine> {
    if m.determinant().abs() < 1e-12 {
        None
    } else {
        Some(m.inverse())
    }
}

fn param_color(t: f32, extend: [bool; 2], lut: &[[f32; 3]; LUT_SIZE]) -> Option<[f32; 3]> {
    let t = if t < 0.0 {
        if !extend[0] {
            return None;
        }
        0.0
    } else if t > 1.0 {
        if !extend[1] {
            return None;
        }
        1.0
    } else {
        t
    };

    Some(lut[(t * (LUT_SIZE - 1) as f32 + 0.5) as usize])
}

/// The interpolation parameter of the circle family through `p`, largest
/// root preferred, or `None` when no circle reaches the point.
fn radial_param(p: Point, c0: Point, r0: f64, c1: Point, r1: f64) -> Option<f32> {
    let dc = c1 - c0;
    let dr = r1 - r0;
    let f = p - c0;

    let a = dc.hypot2() - dr * dr;
    let b = f.dot(dc) + r0 * dr;
    let c = f.hypot2() - r0 * r0;

    let t = if a.abs() < 1e-9 {
        if b.abs() < 1e-9 {
            return None;
        }
        c / (2.0 * b)
    } else {
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sqrt = disc.sqrt();
        let t1 = (b + sqrt) / a;
        let t2 = (b - sqrt) / a;

        // Prefer the larger parameter whose circle has positive radius.
        if r0 + t1 * dr >= 0.0 {
            t1
        } else if r0 + t2 * dr >= 0.0 {
            t2
        } else {
            return None;
        }
    };

    Some(t as f32)
}

fn paint_parametric(
    dst: &mut Pixmap,
    mut shape: Option<&mut Pixmap>,
    region: IRect,
    alpha: f32,
    color_at: impl Fn(i32, i32) -> Option<[f32; 3]>,
) {
    let n = dst.n();
    let a255 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let Some(rgb) = color_at(x, y) else {
                continue;
            };

            let Some(offset) = dst.offset_of(x, y) else {
                continue;
            };

            let src = crate::blend::premultiply(rgb, alpha, n);
            let data = dst.data_mut();

            for c in 0..n {
                let d = data[offset + c];
                data[offset + c] =
                    src[c] + ((d as u32 * (255 - a255) as u32 + 127) / 255) as u8;
            }

            if let Some(shape) = shape.as_deref_mut() {
                if let Some(soff) = shape.offset_of(x, y) {
                    shape.data_mut()[soff] = 255;
                }
            }
        }
    }
}

fn paint_triangle(
    dst: &mut Pixmap,
    mut shape: Option<&mut Pixmap>,
    triangle: &MeshTriangle,
    ctm: Affine,
    alpha: f32,
    region: &IRect,
) {
    let p: Vec<Point> = triangle
        .v
        .iter()
        .map(|v| ctm * Point::new(v.x as f64, v.y as f64))
        .collect();

    let min_x = p.iter().map(|p| p.x).fold(f64::MAX, f64::min).floor() as i32;
    let max_x = p.iter().map(|p| p.x).fold(f64::MIN, f64::max).ceil() as i32;
    let min_y = p.iter().map(|p| p.y).fold(f64::MAX, f64::min).floor() as i32;
    let max_y = p.iter().map(|p| p.y).fold(f64::MIN, f64::max).ceil() as i32;

    let bounds = IRect::new(min_x, min_y, max_x, max_y).intersect(region);
    if bounds.is_empty() {
        return;
    }

    let area = (p[1].x - p[0].x) * (p[2].y - p[0].y) - (p[2].x - p[0].x) * (p[1].y - p[0].y);
    if area.abs() < 1e-12 {
        return;
    }

    let n = dst.n();
    let a255 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

    for y in bounds.y0..bounds.y1 {
        for x in bounds.x0..bounds.x1 {
            let q = Point::new(x as f64 + 0.5, y as f64 + 0.5);

            // Barycentric weights.
            let w0 = ((p[1].x - q.x) * (p[2].y - q.y) - (p[2].x - q.x) * (p[1].y - q.y)) / area;
            let w1 = ((p[2].x - q.x) * (p[0].y - q.y) - (p[0].x - q.x) * (p[2].y - q.y)) / area;
            let w2 = 1.0 - w0 - w1;

            if w0 < -1e-6 || w1 < -1e-6 || w2 < -1e-6 {
                continue;
            }

            let rgb = [
                (triangle.v[0].rgb[0] as f64 * w0
                    + triangle.v[1].rgb[0] as f64 * w1
                    + triangle.v[2].rgb[0] as f64 * w2) as f32,
                (triangle.v[0].rgb[1] as f64 * w0
                    + triangle.v[1].rgb[1] as f64 * w1
                    + triangle.v[2].rgb[1] as f64 * w2) as f32,
                (triangle.v[0].rgb[2] as f64 * w0
                    + triangle.v[1].rgb[2] as f64 * w1
                    + triangle.v[2].rgb[2] as f64 * w2) as f32,
            ];

            let Some(offset) = dst.offset_of(x, y) else {
                continue;
            };

            let src = crate::blend::premultiply(rgb, alpha, n);
            let data = dst.data_mut();

            for c in 0..n {
                let d = data[offset + c];
                data[offset + c] =
                    src[c] + ((d as u32 * (255 - a255) as u32 + 127) / 255) as u8;
            }

            if let Some(shape) = shape.as_deref_mut() {
                if let Some(soff) = shape.offset_of(x, y) {
                    shape.data_mut()[soff] = 255;
                }
            }
        }
    }
}
