//! The graphics state maintained by the interpreter.

use crate::color::Color;
use crate::device::{BlendMode, StrokeState};
use crate::font::Font;
use kurbo::Affine;
use std::sync::Arc;
use tarn_syntax::object::Name;

/// Text-specific parameters.
#[derive(Clone)]
pub struct TextState {
    pub char_space: f32,
    pub word_space: f32,
    /// Horizontal scaling as a fraction (Tz / 100).
    pub h_scale: f32,
    pub leading: f32,
    pub rise: f32,
    /// The raw Tr mode, 0..=7.
    pub render_mode: i32,
    pub size: f32,
    pub font: Option<Arc<Font>>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_space: 0.0,
            word_space: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
            size: 0.0,
            font: None,
        }
    }
}

/// One slot of the graphics-state stack.
#[derive(Clone)]
pub struct GraphicsState {
    pub ctm: Affine,
    pub stroke: StrokeState,
    pub fill_color: Color,
    pub stroke_color: Color,
    pub fill_alpha: f32,
    pub stroke_alpha: f32,
    pub blend: BlendMode,
    /// Set when the fill colour space is /Pattern, naming the pattern.
    pub fill_pattern: Option<Name>,
    pub stroke_pattern: Option<Name>,
    /// How many device clip scopes were open when this state was saved.
    pub clip_base: usize,
    pub text: TextState,
}

impl GraphicsState {
    pub fn new(ctm: Affine) -> Self {
        Self {
            ctm,
            stroke: StrokeState::default(),
            fill_color: Color::black(),
            stroke_color: Color::black(),
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            blend: BlendMode::Normal,
            fill_pattern: None,
            stroke_pattern: None,
            clip_base: 0,
            text: TextState::default(),
        }
    }
}
