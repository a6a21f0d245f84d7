//! A device that only measures.

use crate::color::Color;
use crate::device::{Device, FillRule, StrokeState, TextSpan};
use crate::image::Image;
use crate::shading::{Shading, ShadingKind};
use kurbo::{Affine, BezPath, Point, Rect, Shape};

/// Unions the device-space bounds of every mark it sees.
#[derive(Default)]
pub struct BboxDevice {
    bbox: Option<Rect>,
}

impl BboxDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// The union of all marks, or `None` when nothing was drawn.
    pub fn bbox(&self) -> Option<Rect> {
        self.bbox
    }

    fn add(&mut self, rect: Rect) {
        if rect.width() < 0.0 || rect.height() < 0.0 {
            return;
        }

        self.bbox = Some(match self.bbox {
            Some(b) => b.union(rect),
            None => rect,
        });
    }

    fn add_path(&mut self, path: &BezPath, ctm: Affine) {
        if path.elements().is_empty() {
            return;
        }

        self.add(ctm.transform_rect_bbox(path.bounding_box()));
    }
}

/// The unit square, which images map onto.
fn unit_rect() -> Rect {
    Rect::new(0.0, 0.0, 1.0, 1.0)
}

impl Device for BboxDevice {
    fn fill_path(&mut self, path: &BezPath, _rule: FillRule, ctm: Affine, _color: &Color) {
        self.add_path(path, ctm);
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine, _color: &Color) {
        if path.elements().is_empty() {
            return;
        }

        let grown = path.bounding_box().inflate(
            stroke.line_width as f64 * 0.5,
            stroke.line_width as f64 * 0.5,
        );
        self.add(ctm.transform_rect_bbox(grown));
    }

    fn fill_text(&mut self, text: &TextSpan, ctm: Affine, _color: &Color) {
        self.measure_text(text, ctm);
    }

    fn stroke_text(&mut self, text: &TextSpan, _s: &StrokeState, ctm: Affine, _color: &Color) {
        self.measure_text(text, ctm);
    }

    fn fill_image(&mut self, _image: &Image, ctm: Affine, _alpha: f32) {
        self.add(ctm.transform_rect_bbox(unit_rect()));
    }

    fn fill_image_mask(&mut self, _image: &Image, ctm: Affine, _color: &Color) {
        self.add(ctm.transform_rect_bbox(unit_rect()));
    }

    fn fill_shade(&mut self, shade: &Shading, ctm: Affine, _alpha: f32) {
        match &shade.kind {
            ShadingKind::Mesh { triangles } => {
                for t in triangles {
                    for v in &t.v {
                        let p = ctm * Point::new(v.x as f64, v.y as f64);
                        self.add(Rect::new(p.x, p.y, p.x, p.y));
                    }
                }
            }
            ShadingKind::Axial { coords, .. } => {
                let a = ctm * Point::new(coords[0] as f64, coords[1] as f64);
                let b = ctm * Point::new(coords[2] as f64, coords[3] as f64);
                self.add(Rect::from_points(a, b));
            }
            ShadingKind::Radial { coords, .. } => {
                let r = coords[2].max(coords[5]) as f64;
                let a = Point::new(coords[0] as f64, coords[1] as f64);
                let b = Point::new(coords[3] as f64, coords[4] as f64);
                let raw = Rect::from_points(a, b).inflate(r, r);
                self.add(ctm.transform_rect_bbox(raw));
            }
        }
    }
}

impl BboxDevice {
    fn measure_text(&mut self, text: &TextSpan, ctm: Affine) {
        for glyph in &text.glyphs {
            // The em square of each glyph, conservatively.
            let em = Rect::new(0.0, -0.2, 1.0, 1.0);
            self.add((ctm * glyph.transform).transform_rect_bbox(em));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_union() {
        let mut dev = BboxDevice::new();

        let mut path = BezPath::new();
        path.move_to((10.0, 10.0));
        path.line_to((20.0, 10.0));
        path.line_to((20.0, 30.0));
        path.close_path();

        dev.fill_path(&path, FillRule::NonZero, Affine::IDENTITY, &Color::black());

        let mut second = BezPath::new();
        second.move_to((-5.0, 0.0));
        second.line_to((0.0, 0.0));
        second.line_to((0.0, 5.0));
        second.close_path();

        dev.fill_path(&second, FillRule::NonZero, Affine::IDENTITY, &Color::black());

        let bbox = dev.bbox().unwrap();
        assert_eq!((bbox.x0, bbox.y0, bbox.x1, bbox.y1), (-5.0, 0.0, 20.0, 30.0));
    }

    #[test]
    fn strokes_grow_by_half_line_width() {
        let mut dev = BboxDevice::new();

        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((10.0, 0.0));

        let stroke = StrokeState {
            line_width: 4.0,
            ..StrokeState::default()
        };

        dev.stroke_path(&path, &stroke, Affine::IDENTITY, &Color::black());

        let bbox = dev.bbox().unwrap();
        assert_eq!((bbox.y0, bbox.y1), (-2.0, 2.0));
    }

    #[test]
    fn transform_applies() {
        let mut dev = BboxDevice::new();

        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((1.0, 1.0));

        dev.fill_path(
            &path,
            FillRule::NonZero,
            Affine::scale(10.0),
            &Color::black(),
        );

        let bbox = dev.bbox().unwrap();
        assert_eq!((bbox.x1, bbox.y1), (10.0, 10.0));
    }
}
