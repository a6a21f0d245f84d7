//! Scanline rasterization of paths into coverage masks.
//!
//! Paths are flattened into an edge list, then swept one scanline at a
//! time with vertical supersampling and exact horizontal coverage. The
//! output is a byte mask the blending layer composites with.

use kurbo::{Affine, BezPath, PathEl, Point, Shape, Stroke};
use tarn_interpret::device::StrokeState;
use tarn_interpret::FillRule;
use tarn_syntax::geom::{expansion, IRect};

/// Vertical subsamples per scanline.
const SUB_SAMPLES: usize = 4;

/// Flatten tolerance in device pixels.
const TOLERANCE: f64 = 0.25;

/// A coverage mask positioned in device space.
pub struct CoverageMask {
    pub bbox: IRect,
    /// One byte per pixel, row-major within `bbox`.
    pub data: Vec<u8>,
}

impl CoverageMask {
    pub fn empty() -> Self {
        Self {
            bbox: IRect::EMPTY,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_empty()
    }

    #[inline]
    pub fn coverage_at(&self, x: i32, y: i32) -> u8 {
        if !self.bbox.contains(x, y) {
            return 0;
        }

        let ix = (x - self.bbox.x0) as usize;
        let iy = (y - self.bbox.y0) as usize;
        self.data[iy * self.bbox.width() as usize + ix]
    }
}

struct Segment {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    /// +1 for downward edges, -1 for upward.
    dir: i32,
}

/// Flatten a device-space path into non-horizontal segments.
fn flatten(path: &BezPath, ctm: Affine) -> Vec<Segment> {
    let transformed = ctm * path.clone();

    let mut segments = Vec::new();
    let mut start = Point::ZERO;
    let mut last = Point::ZERO;

    let mut add = |a: Point, b: Point| {
        if a.y == b.y {
            return;
        }

        if a.y < b.y {
            segments.push(Segment {
                x0: a.x,
                y0: a.y,
                x1: b.x,
                y1: b.y,
                dir: 1,
            });
        } else {
            segments.push(Segment {
                x0: b.x,
                y0: b.y,
                x1: a.x,
                y1: a.y,
                dir: -1,
            });
        }
    };

    transformed.flatten(TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            // An unclosed sub-path is closed implicitly for filling.
            add(last, start);
            start = p;
            last = p;
        }
        PathEl::LineTo(p) => {
            add(last, p);
            last = p;
        }
        PathEl::ClosePath => {
            add(last, start);
            last = start;
        }
        // Flattening only emits the variants above.
        _ => {}
    });

    add(last, start);

    segments
}

/// Rasterize a filled path, clipped to `clip`.
pub fn fill_coverage(
    path: &BezPath,
    ctm: Affine,
    rule: FillRule,
    clip: &IRect,
) -> CoverageMask {
    let segments = flatten(path, ctm);
    rasterize(&segments, rule, clip)
}

/// Rasterize a stroked path, clipped to `clip`.
///
/// The stroke outline is built in user space so line width semantics match
/// the document, then transformed and filled non-zero.
pub fn stroke_coverage(
    path: &BezPath,
    stroke: &StrokeState,
    ctm: Affine,
    clip: &IRect,
) -> CoverageMask {
    let scale = expansion(ctm);
    let mut width = stroke.line_width.max(0.01) as f64;

    // Hairlines: keep the device-space width near one pixel.
    if width * scale < 1.0 && scale > 0.0 {
        width = 1.0 / scale;
    }

    let style = Stroke {
        width,
        join: stroke.line_join,
        miter_limit: stroke.miter_limit as f64,
        start_cap: stroke.line_cap,
        end_cap: stroke.line_cap,
        dash_pattern: stroke.dash_array.iter().map(|d| *d as f64).collect(),
        dash_offset: stroke.dash_offset as f64,
    };

    let outline = kurbo::stroke(
        path.iter(),
        &style,
        &kurbo::StrokeOpts::default(),
        TOLERANCE / scale.max(1e-6),
    );

    let segments = flatten(&outline, ctm);
    rasterize(&segments, FillRule::NonZero, clip)
}

fn rasterize(segments: &[Segment], rule: FillRule, clip: &IRect) -> CoverageMask {
    if segments.is_empty() || clip.is_empty() {
        return CoverageMask::empty();
    }

    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);

    for s in segments {
        min_x = min_x.min(s.x0).min(s.x1);
        max_x = max_x.max(s.x0).max(s.x1);
        min_y = min_y.min(s.y0);
        max_y = max_y.max(s.y1);
    }

    let bbox = IRect::new(
        min_x.floor() as i32,
        min_y.floor() as i32,
        max_x.ceil() as i32,
        max_y.ceil() as i32,
    )
    .intersect(clip);

    if bbox.is_empty() {
        return CoverageMask::empty();
    }

    let width = bbox.width() as usize;
    let mut data = vec![0u8; width * bbox.height() as usize];
    let mut accum = vec![0f32; width];
    let mut crossings: Vec<(f64, i32)> = Vec::new();

    for y in bbox.y0..bbox.y1 {
        accum.fill(0.0);

        for sub in 0..SUB_SAMPLES {
            let sy = y as f64 + (sub as f64 + 0.5) / SUB_SAMPLES as f64;

            crossings.clear();
            for s in segments {
                if sy >= s.y0 && sy < s.y1 {
                    let t = (sy - s.y0) / (s.y1 - s.y0);
                    crossings.push((s.x0 + t * (s.x1 - s.x0), s.dir));
                }
            }

            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Walk the crossings accumulating winding, adding the spans
            // that are inside under the active rule.
            let mut winding = 0;
            let mut span_start = 0.0f64;

            for (x, dir) in &crossings {
                let was_inside = match rule {
                    FillRule::NonZero => winding != 0,
                    FillRule::EvenOdd => winding % 2 != 0,
                };

                winding += dir;

                let is_inside = match rule {
                    FillRule::NonZero => winding != 0,
                    FillRule::EvenOdd => winding % 2 != 0,
                };

                if !was_inside && is_inside {
                    span_start = *x;
                } else if was_inside && !is_inside {
                    add_span(&mut accum, bbox.x0, span_start, *x);
                }
            }
        }

        let row = &mut data[(y - bbox.y0) as usize * width..][..width];
        for (dst, cov) in row.iter_mut().zip(accum.iter()) {
            *dst = ((cov / SUB_SAMPLES as f32) * 255.0 + 0.5).min(255.0) as u8;
        }
    }

    CoverageMask { bbox, data }
}

/// Add one sub-scanline span with exact fractional ends.
fn add_span(accum: &mut [f32], origin_x: i32, x0: f64, x1: f64) {
    let left = x0.max(origin_x as f64);
    let right = x1.min(origin_x as f64 + accum.len() as f64);

    if right <= left {
        return;
    }

    let first = left.floor() as i64;
    let last = (right.ceil() as i64 - 1).max(first);

    for px in first..=last {
        let cell_left = px as f64;
        let cell_right = cell_left + 1.0;
        let cover = (right.min(cell_right) - left.max(cell_left)).max(0.0);

        let index = (px - origin_x as i64) as usize;
        if let Some(slot) = accum.get_mut(index) {
            *slot += cover as f32;
        }
    }
}

/// Detect a path that reduces to an axis-aligned rectangle under `ctm`.
///
/// Such clips only narrow the scissor and need no mask pixmap.
pub fn path_as_aligned_rect(path: &BezPath, ctm: Affine) -> Option<IRect> {
    let [a, b, c, d, _, _] = ctm.as_coeffs();
    let rectilinear = (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0);

    if !rectilinear {
        return None;
    }

    let mut points: Vec<Point> = Vec::with_capacity(6);

    for el in path.elements() {
        match el {
            PathEl::MoveTo(p) | PathEl::LineTo(p) => points.push(*p),
            PathEl::ClosePath => {}
            // Curves disqualify immediately.
            _ => return None,
        }
    }

    if !(4..=5).contains(&points.len()) {
        return None;
    }

    // Five points may close back onto the start.
    if points.len() == 5 && points[4] != points[0] {
        return None;
    }

    let quad = &points[..4];
    let rect = path.bounding_box();

    for p in quad {
        let on_x = p.x == rect.x0 || p.x == rect.x1;
        let on_y = p.y == rect.y0 || p.y == rect.y1;

        if !(on_x && on_y) {
            return None;
        }
    }

    // Each edge must stay axis-aligned.
    for i in 0..4 {
        let p = quad[i];
        let q = quad[(i + 1) % 4];

        if p.x != q.x && p.y != q.y {
            return None;
        }
    }

    let device = ctm.transform_rect_bbox(rect);

    // Only boxes that land on the pixel grid skip the mask; anything
    // fractional needs anti-aliased edges.
    let aligned = device.x0.fract() == 0.0
        && device.y0.fract() == 0.0
        && device.x1.fract() == 0.0
        && device.y1.fract() == 0.0;

    aligned.then(|| IRect::covering(&device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;

    fn rect_path(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
        Rect::new(x0, y0, x1, y1).to_path(0.1)
    }

    #[test]
    fn pixel_aligned_rect_has_hard_coverage() {
        let mask = fill_coverage(
            &rect_path(2.0, 2.0, 8.0, 6.0),
            Affine::IDENTITY,
            FillRule::NonZero,
            &IRect::new(0, 0, 10, 10),
        );

        assert_eq!(mask.bbox, IRect::new(2, 2, 8, 6));
        assert!(mask.data.iter().all(|c| *c == 255));
        assert_eq!(mask.coverage_at(1, 3), 0);
        assert_eq!(mask.coverage_at(2, 3), 255);
    }

    #[test]
    fn fractional_edges_are_antialiased()
    {
        let mask = fill_coverage(
            &rect_path(0.5, 0.0, 2.5, 1.0),
            Affine::IDENTITY,
            FillRule::NonZero,
            &IRect::new(0, 0, 10, 10),
        );

        assert_eq!(mask.coverage_at(0, 0), 128);
        assert_eq!(mask.coverage_at(1, 0), 255);
        assert_eq!(mask.coverage_at(2, 0), 128);
    }

    #[test]
    fn nonzero_and_evenodd_differ_on_overlap() {
        // Two overlapping same-direction squares.
        let mut path = rect_path(0.0, 0.0, 4.0, 4.0);
        path.extend(rect_path(2.0, 0.0, 6.0, 4.0));

        let clip = IRect::new(0, 0, 10, 10);

        let nz = fill_coverage(&path, Affine::IDENTITY, FillRule::NonZero, &clip);
        let eo = fill_coverage(&path, Affine::IDENTITY, FillRule::EvenOdd, &clip);

        // The overlap region [2,4) is inside for nonzero, outside for
        // even-odd.
        assert_eq!(nz.coverage_at(3, 2), 255);
        assert_eq!(eo.coverage_at(3, 2), 0);
        assert_eq!(eo.coverage_at(1, 2), 255);
        assert_eq!(eo.coverage_at(5, 2), 255);
    }

    #[test]
    fn union_of_rules_matches_outline_bbox() {
        // For a simple path both rules fill the same region.
        let path = rect_path(1.0, 1.0, 5.0, 5.0);
        let clip = IRect::new(0, 0, 8, 8);

        let nz = fill_coverage(&path, Affine::IDENTITY, FillRule::NonZero, &clip);
        let eo = fill_coverage(&path, Affine::IDENTITY, FillRule::EvenOdd, &clip);

        assert_eq!(nz.bbox, eo.bbox);
        assert_eq!(nz.data, eo.data);
    }

    #[test]
    fn rect_detection() {
        let path = rect_path(1.0, 2.0, 5.0, 7.0);
        let rect = path_as_aligned_rect(&path, Affine::IDENTITY);
        assert_eq!(rect, Some(IRect::new(1, 2, 5, 7)));

        // Fractional boxes need a real mask.
        let path = rect_path(1.25, 2.0, 5.0, 7.0);
        assert_eq!(path_as_aligned_rect(&path, Affine::IDENTITY), None);

        // Rotation by 45 degrees is not a rectangle any more.
        let path = rect_path(1.0, 2.0, 5.0, 7.0);
        let rotated = Affine::rotate(std::f64::consts::FRAC_PI_4);
        assert_eq!(path_as_aligned_rect(&path, rotated), None);

        // A triangle is not a rectangle.
        let mut tri = BezPath::new();
        tri.move_to((0.0, 0.0));
        tri.line_to((4.0, 0.0));
        tri.line_to((0.0, 4.0));
        tri.close_path();
        assert_eq!(path_as_aligned_rect(&tri, Affine::IDENTITY), None);

        // Scaling by an integer factor keeps alignment.
        let path = rect_path(1.0, 1.0, 2.0, 2.0);
        let scaled = Affine::scale(2.0);
        assert_eq!(
            path_as_aligned_rect(&path, scaled),
            Some(IRect::new(2, 2, 4, 4))
        );
    }

    #[test]
    fn stroke_covers_the_line() {
        let mut path = BezPath::new();
        path.move_to((2.0, 5.0));
        path.line_to((8.0, 5.0));

        let stroke = StrokeState {
            line_width: 2.0,
            ..StrokeState::default()
        };

        let mask = stroke_coverage(&path, &stroke, Affine::IDENTITY, &IRect::new(0, 0, 10, 10));

        // The stroked band spans y in [4, 6).
        assert_eq!(mask.coverage_at(5, 4), 255);
        assert_eq!(mask.coverage_at(5, 5), 255);
        assert_eq!(mask.coverage_at(5, 2), 0);
        assert_eq!(mask.coverage_at(5, 8), 0);
    }
}
