//! The device contract: the consumer interface for drawing operations.
//!
//! A device receives the semantic stream of marks the interpreter produces:
//! paths, text, images, shadings, and the scope operations for clips,
//! masks, transparency groups and pattern tiles. Every scope-opening call
//! is matched by its closer; the interpreter guarantees balance, including
//! when a run is cut short.
//!
//! Devices need not render. A bounds device only measures, a list device
//! records the call sequence for later replay, a text device extracts
//! characters.

use crate::color::Color;
use crate::font::Font;
use crate::image::Image;
use crate::shading::Shading;
use kurbo::{Affine, BezPath, Cap, Join, Rect};
use smallvec::SmallVec;
use std::sync::Arc;

/// Path fill rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Stroke parameters, in user space.
#[derive(Debug, Clone)]
pub struct StrokeState {
    pub line_width: f32,
    pub line_cap: Cap,
    pub line_join: Join,
    pub miter_limit: f32,
    pub dash_array: SmallVec<[f32; 4]>,
    pub dash_offset: f32,
}

impl Default for StrokeState {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            line_cap: Cap::Butt,
            line_join: Join::Miter,
            miter_limit: 10.0,
            dash_array: SmallVec::new(),
            dash_offset: 0.0,
        }
    }
}

/// The blend modes of the transparency model. `Normal` is mode 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub fn from_name(name: &[u8]) -> BlendMode {
        match name {
            b"Multiply" => BlendMode::Multiply,
            b"Screen" => BlendMode::Screen,
            b"Overlay" => BlendMode::Overlay,
            b"Darken" => BlendMode::Darken,
            b"Lighten" => BlendMode::Lighten,
            b"ColorDodge" => BlendMode::ColorDodge,
            b"ColorBurn" => BlendMode::ColorBurn,
            b"HardLight" => BlendMode::HardLight,
            b"SoftLight" => BlendMode::SoftLight,
            b"Difference" => BlendMode::Difference,
            b"Exclusion" => BlendMode::Exclusion,
            b"Normal" | b"Compatible" => BlendMode::Normal,
            other => {
                log::warn!(
                    "unknown blend mode {}; using Normal",
                    String::from_utf8_lossy(other)
                );
                BlendMode::Normal
            }
        }
    }
}

/// One positioned glyph of a text span.
#[derive(Debug, Clone)]
pub struct Glyph {
    /// Glyph id within the font (the character code for simple fonts).
    pub id: u32,
    /// The raw character code.
    pub code: u32,
    /// Unicode interpretation, when one is known.
    pub unicode: Option<char>,
    /// Glyph-space to user-space transform (text matrix already applied).
    pub transform: Affine,
}

/// A run of glyphs sharing one font and size.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub font: Arc<Font>,
    pub size: f32,
    pub glyphs: Vec<Glyph>,
}

/// How `clip_text` accumulates glyphs into a clip scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClipAccumulate {
    /// A single atomic text clip: open, fill, ready to use.
    Single,
    /// Open the clip scope and add the first glyphs.
    Begin,
    /// Append more glyphs to the already-open scope.
    Continue,
}

/// The closed set of operations a render target consumes.
///
/// Default implementations do nothing, so a device only spells out what it
/// cares about.
#[allow(unused_variables)]
pub trait Device {
    // Paths.
    fn fill_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine, color: &Color) {}
    fn stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine, color: &Color) {}
    fn clip_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine) {}
    fn clip_stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine) {}

    // Text.
    fn fill_text(&mut self, text: &TextSpan, ctm: Affine, color: &Color) {}
    fn stroke_text(&mut self, text: &TextSpan, stroke: &StrokeState, ctm: Affine, color: &Color) {}
    fn clip_text(&mut self, text: &TextSpan, ctm: Affine, accumulate: ClipAccumulate) {}
    fn clip_stroke_text(&mut self, text: &TextSpan, stroke: &StrokeState, ctm: Affine) {}
    /// Invisible text; devices that extract rather than render still see it.
    fn ignore_text(&mut self, text: &TextSpan, ctm: Affine) {}

    // Images.
    fn fill_image(&mut self, image: &Image, ctm: Affine, alpha: f32) {}
    fn fill_image_mask(&mut self, image: &Image, ctm: Affine, color: &Color) {}
    fn clip_image_mask(&mut self, image: &Image, ctm: Affine) {}

    // Shadings.
    fn fill_shade(&mut self, shade: &Shading, ctm: Affine, alpha: f32) {}

    // Scopes. Every opener is matched by its closer.
    fn pop_clip(&mut self) {}
    fn begin_mask(&mut self, area: Rect, luminosity: bool, backdrop: &Color) {}
    fn end_mask(&mut self) {}
    fn begin_group(
        &mut self,
        area: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) {
    }
    fn end_group(&mut self) {}
    fn begin_tile(&mut self, area: Rect, view: Rect, xstep: f32, ystep: f32, ctm: Affine) {}
    fn end_tile(&mut self) {}

    /// Teardown hook; runs even when a page run ends in an error.
    fn free_user(&mut self) {}
}
