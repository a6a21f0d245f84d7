//! A device that records the call sequence for later replay.

use crate::color::Color;
use crate::device::{
    BlendMode, ClipAccumulate, Device, FillRule, StrokeState, TextSpan,
};
use crate::image::Image;
use crate::shading::Shading;
use kurbo::{Affine, BezPath, Rect};
use std::sync::Arc;

/// One recorded operation.
#[derive(Clone)]
pub enum DisplayItem {
    FillPath(BezPath, FillRule, Affine, Color),
    StrokePath(BezPath, StrokeState, Affine, Color),
    ClipPath(BezPath, FillRule, Affine),
    ClipStrokePath(BezPath, StrokeState, Affine),
    FillText(TextSpan, Affine, Color),
    StrokeText(TextSpan, StrokeState, Affine, Color),
    ClipText(TextSpan, Affine, ClipAccumulate),
    ClipStrokeText(TextSpan, StrokeState, Affine),
    IgnoreText(TextSpan, Affine),
    FillImage(Arc<Image>, Affine, f32),
    FillImageMask(Arc<Image>, Affine, Color),
    ClipImageMask(Arc<Image>, Affine),
    FillShade(Arc<Shading>, Affine, f32),
    PopClip,
    BeginMask(Rect, bool, Color),
    EndMask,
    BeginGroup(Rect, bool, bool, BlendMode, f32),
    EndGroup,
    BeginTile(Rect, Rect, f32, f32, Affine),
    EndTile,
}

/// Records everything it is asked to draw.
#[derive(Default)]
pub struct ListDevice {
    items: Vec<DisplayItem>,
}

impl ListDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Re-issue the recorded sequence against another device.
    pub fn replay(&self, target: &mut dyn Device) {
        for item in &self.items {
            match item {
                DisplayItem::FillPath(path, rule, ctm, color) => {
                    target.fill_path(path, *rule, *ctm, color)
                }
                DisplayItem::StrokePath(path, stroke, ctm, color) => {
                    target.stroke_path(path, stroke, *ctm, color)
                }
                DisplayItem::ClipPath(path, rule, ctm) => target.clip_path(path, *rule, *ctm),
                DisplayItem::ClipStrokePath(path, stroke, ctm) => {
                    target.clip_stroke_path(path, stroke, *ctm)
                }
                DisplayItem::FillText(span, ctm, color) => target.fill_text(span, *ctm, color),
                DisplayItem::StrokeText(span, stroke, ctm, color) => {
                    target.stroke_text(span, stroke, *ctm, color)
                }
                DisplayItem::ClipText(span, ctm, accumulate) => {
                    target.clip_text(span, *ctm, *accumulate)
                }
                DisplayItem::ClipStrokeText(span, stroke, ctm) => {
                    target.clip_stroke_text(span, stroke, *ctm)
                }
                DisplayItem::IgnoreText(span, ctm) => target.ignore_text(span, *ctm),
                DisplayItem::FillImage(image, ctm, alpha) => {
                    target.fill_image(image, *ctm, *alpha)
                }
                DisplayItem::FillImageMask(image, ctm, color) => {
                    target.fill_image_mask(image, *ctm, color)
                }
                DisplayItem::ClipImageMask(image, ctm) => target.clip_image_mask(image, *ctm),
                DisplayItem::FillShade(shade, ctm, alpha) => {
                    target.fill_shade(shade, *ctm, *alpha)
                }
                DisplayItem::PopClip => target.pop_clip(),
                DisplayItem::BeginMask(area, luminosity, backdrop) => {
                    target.begin_mask(*area, *luminosity, backdrop)
                }
                DisplayItem::EndMask => target.end_mask(),
                DisplayItem::BeginGroup(area, isolated, knockout, blend, alpha) => {
                    target.begin_group(*area, *isolated, *knockout, *blend, *alpha)
                }
                DisplayItem::EndGroup => target.end_group(),
                DisplayItem::BeginTile(area, view, xstep, ystep, ctm) => {
                    target.begin_tile(*area, *view, *xstep, *ystep, *ctm)
                }
                DisplayItem::EndTile => target.end_tile(),
            }
        }
    }
}

impl Device for ListDevice {
    fn fill_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine, color: &Color) {
        self.items
            .push(DisplayItem::FillPath(path.clone(), rule, ctm, color.clone()));
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine, color: &Color) {
        self.items.push(DisplayItem::StrokePath(
            path.clone(),
            stroke.clone(),
            ctm,
            color.clone(),
        ));
    }

    fn clip_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine) {
        self.items.push(DisplayItem::ClipPath(path.clone(), rule, ctm));
    }

    fn clip_stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine) {
        self.items
            .push(DisplayItem::ClipStrokePath(path.clone(), stroke.clone(), ctm));
    }

    fn fill_text(&mut self, text: &TextSpan, ctm: Affine, color: &Color) {
        self.items
            .push(DisplayItem::FillText(text.clone(), ctm, color.clone()));
    }

    fn stroke_text(&mut self, text: &TextSpan, stroke: &StrokeState, ctm: Affine, color: &Color) {
        self.items.push(DisplayItem::StrokeText(
            text.clone(),
            stroke.clone(),
            ctm,
            color.clone(),
        ));
    }

    fn clip_text(&mut self, text: &TextSpan, ctm: Affine, accumulate: ClipAccumulate) {
        self.items
            .push(DisplayItem::ClipText(text.clone(), ctm, accumulate));
    }

    fn clip_stroke_text(&mut self, text: &TextSpan, stroke: &StrokeState, ctm: Affine) {
        self.items
            .push(DisplayItem::ClipStrokeText(text.clone(), stroke.clone(), ctm));
    }

    fn ignore_text(&mut self, text: &TextSpan, ctm: Affine) {
        self.items.push(DisplayItem::IgnoreText(text.clone(), ctm));
    }

    fn fill_image(&mut self, image: &Image, ctm: Affine, alpha: f32) {
        self.items
            .push(DisplayItem::FillImage(Arc::new(image.clone()), ctm, alpha));
    }

    fn fill_image_mask(&mut self, image: &Image, ctm: Affine, color: &Color) {
        self.items.push(DisplayItem::FillImageMask(
            Arc::new(image.clone()),
            ctm,
            color.clone(),
        ));
    }

    fn clip_image_mask(&mut self, image: &Image, ctm: Affine) {
        self.items
            .push(DisplayItem::ClipImageMask(Arc::new(image.clone()), ctm));
    }

    fn fill_shade(&mut self, shade: &Shading, ctm: Affine, alpha: f32) {
        self.items
            .push(DisplayItem::FillShade(Arc::new(shade.clone()), ctm, alpha));
    }

    fn pop_clip(&mut self) {
        self.items.push(DisplayItem::PopClip);
    }

    fn begin_mask(&mut self, area: Rect, luminosity: bool, backdrop: &Color) {
        self.items
            .push(DisplayItem::BeginMask(area, luminosity, backdrop.clone()));
    }

    fn end_mask(&mut self) {
        self.items.push(DisplayItem::EndMask);
    }

    fn begin_group(
        &mut self,
        area: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) {
        self.items
            .push(DisplayItem::BeginGroup(area, isolated, knockout, blend, alpha));
    }

    fn end_group(&mut self) {
        self.items.push(DisplayItem::EndGroup);
    }

    fn begin_tile(&mut self, area: Rect, view: Rect, xstep: f32, ystep: f32, ctm: Affine) {
        self.items
            .push(DisplayItem::BeginTile(area, view, xstep, ystep, ctm));
    }

    fn end_tile(&mut self) {
        self.items.push(DisplayItem::EndTile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_replay() {
        let mut list = ListDevice::new();

        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((1.0, 0.0));
        path.line_to((1.0, 1.0));
        path.close_path();

        list.fill_path(&path, FillRule::NonZero, Affine::IDENTITY, &Color::black());
        list.clip_path(&path, FillRule::EvenOdd, Affine::IDENTITY);
        list.pop_clip();

        assert_eq!(list.len(), 3);

        // Replaying into a second list reproduces the sequence.
        let mut copy = ListDevice::new();
        list.replay(&mut copy);
        assert_eq!(copy.len(), 3);

        assert!(matches!(copy.items()[0], DisplayItem::FillPath(..)));
        assert!(matches!(copy.items()[1], DisplayItem::ClipPath(..)));
        assert!(matches!(copy.items()[2], DisplayItem::PopClip));
    }
}
