//! A device that extracts characters.

use crate::color::Color;
use crate::device::{ClipAccumulate, Device, StrokeState, TextSpan};
use kurbo::{Affine, Point};

/// A single extracted character with its device-space position.
#[derive(Debug, Clone)]
pub struct TextItem {
    pub unicode: char,
    pub position: Point,
    pub size: f32,
}

/// Collects the characters of every text operation, including invisible
/// text (which is how scanned documents carry their OCR layer).
#[derive(Default)]
pub struct TextDevice {
    items: Vec<TextItem>,
}

impl TextDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TextItem] {
        &self.items
    }

    /// The collected text in drawing order.
    pub fn text(&self) -> String {
        self.items.iter().map(|i| i.unicode).collect()
    }

    fn collect(&mut self, span: &TextSpan, ctm: Affine) {
        for glyph in &span.glyphs {
            let Some(unicode) = glyph.unicode else {
                continue;
            };

            let position = (ctm * glyph.transform) * Point::ZERO;

            self.items.push(TextItem {
                unicode,
                position,
                size: span.size,
            });
        }
    }
}

impl Device for TextDevice {
    fn fill_text(&mut self, text: &TextSpan, ctm: Affine, _color: &Color) {
        self.collect(text, ctm);
    }

    fn stroke_text(&mut self, text: &TextSpan, _s: &StrokeState, ctm: Affine, _color: &Color) {
        self.collect(text, ctm);
    }

    fn clip_text(&mut self, text: &TextSpan, ctm: Affine, _accumulate: ClipAccumulate) {
        self.collect(text, ctm);
    }

    fn clip_stroke_text(&mut self, text: &TextSpan, _s: &StrokeState, ctm: Affine) {
        self.collect(text, ctm);
    }

    fn ignore_text(&mut self, text: &TextSpan, ctm: Affine) {
        self.collect(text, ctm);
    }
}
