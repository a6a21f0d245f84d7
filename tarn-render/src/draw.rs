//! The draw device: a stack of compositing states.
//!
//! Slot 0 holds the page's destination. Every clip, soft mask,
//! transparency group, knockout bracket and pattern tile pushes a state;
//! every push is matched by a pop that composites the scope's result onto
//! the state below and releases what the push allocated. Rectangular clips
//! are the exception: they only narrow the scissor.

use crate::blend;
use crate::image;
use crate::pixmap::{PixFormat, Pixmap};
use crate::raster::{self, CoverageMask};
use crate::shade;
use kurbo::{Affine, BezPath, Point, Rect};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tarn_interpret::device::{ClipAccumulate, Device, StrokeState, TextSpan};
use tarn_interpret::image::Image;
use tarn_interpret::{BlendMode, Color, Cookie, FillRule, Font, Shading};
use tarn_syntax::geom::IRect;

/// Initial capacity of the draw-state stack.
const STACK_SIZE: usize = 96;

/// Subpixel quantization steps for glyph positioning.
const HSUBPIX: f64 = 5.0;
const VSUBPIX: f64 = 5.0;

/// More tiles than this per pattern is treated as a malformed document.
const MAX_TILES: i64 = 32 * 1024;

/// A rasterized glyph: an alpha mask positioned in device space.
pub struct GlyphMask {
    pub pixmap: Pixmap,
}

/// The collaborator that turns glyphs into masks.
///
/// `transform` maps the glyph's em square (glyph units divided by 1000) to
/// device space. Returning `None` means the glyph cannot be rasterized;
/// the draw device skips it.
pub trait GlyphRasterizer {
    fn rasterize(&mut self, font: &Font, glyph_id: u32, transform: Affine) -> Option<GlyphMask>;
}

type Buf = Rc<RefCell<Pixmap>>;

fn new_buf(pixmap: Pixmap) -> Buf {
    Rc::new(RefCell::new(pixmap))
}

fn buf_eq(a: &Option<Buf>, b: &Option<Buf>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

#[derive(Clone)]
struct DrawState {
    scissor: IRect,
    dest: Buf,
    mask: Option<Buf>,
    shape: Option<Buf>,
    blend: BlendMode,
    isolated: bool,
    knockout: bool,
    luminosity: bool,
    alpha: f32,
    /// Tile replay state.
    ctm: Affine,
    xstep: f32,
    ystep: f32,
    area: Rect,
    view: Rect,
}

#[derive(Hash, PartialEq, Eq)]
struct GlyphKey {
    font: u64,
    glyph: u32,
    matrix: [u32; 4],
    subpix: (u8, u8),
}

/// The rasterizing device.
pub struct DrawDevice {
    stack: Vec<DrawState>,
    cookie: Option<Arc<Cookie>>,
    rasterizer: Option<Box<dyn GlyphRasterizer>>,
    glyph_cache: FxHashMap<GlyphKey, Option<Rc<Pixmap>>>,
    warned_no_glyphs: bool,
}

impl DrawDevice {
    /// A device rendering into `dest`. The pixmap's bbox is the root
    /// scissor.
    pub fn new(dest: Pixmap) -> Self {
        let scissor = dest.bbox();

        let mut stack = Vec::with_capacity(STACK_SIZE);
        stack.push(DrawState {
            scissor,
            dest: new_buf(dest),
            mask: None,
            shape: None,
            blend: BlendMode::Normal,
            isolated: false,
            knockout: false,
            luminosity: false,
            alpha: 1.0,
            ctm: Affine::IDENTITY,
            xstep: 0.0,
            ystep: 0.0,
            area: Rect::ZERO,
            view: Rect::ZERO,
        });

        Self {
            stack,
            cookie: None,
            rasterizer: None,
            glyph_cache: FxHashMap::default(),
            warned_no_glyphs: false,
        }
    }

    pub fn with_cookie(mut self, cookie: Arc<Cookie>) -> Self {
        self.cookie = Some(cookie);
        self
    }

    pub fn with_glyph_rasterizer(mut self, rasterizer: Box<dyn GlyphRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// The current stack depth (1 when balanced).
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Recover the destination pixmap. The scope stack must be balanced.
    pub fn into_pixmap(mut self) -> Pixmap {
        let root = self.stack.swap_remove(0);
        drop(self.stack);

        match Rc::try_unwrap(root.dest) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        }
    }

    fn top(&self) -> &DrawState {
        self.stack.last().unwrap()
    }

    fn top_mut(&mut self) -> &mut DrawState {
        self.stack.last_mut().unwrap()
    }

    fn push_state(&mut self) {
        let top = self.top().clone();
        self.stack.push(top);
    }

    fn aborted(&self) -> bool {
        self.cookie.as_ref().is_some_and(|c| c.is_aborted())
    }

    /// Paint a coverage mask with a colour into the top state, mirroring
    /// coverage onto the shape plane.
    fn paint_coverage(&mut self, mask: &CoverageMask, color: &Color) {
        if mask.is_empty() {
            return;
        }

        let state = self.top();
        let n = state.dest.borrow().n();
        let premul = blend::premultiply(color.to_rgb(), color.alpha, n);

        blend::paint_mask_color(&mut state.dest.borrow_mut(), mask, &premul);

        if let Some(shape) = &state.shape {
            let alpha = (color.alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
            blend::paint_mask_alpha(&mut shape.borrow_mut(), mask, alpha);
        }
    }

    /// Open the intermediate layer a knockout group gives each paint.
    fn knockout_begin(&mut self) -> bool {
        if !self.top().knockout {
            return false;
        }

        let isolated = self.top().isolated;

        self.push_state();

        let (bbox, format) = {
            let state = self.top();
            let dest = state.dest.borrow();
            (dest.bbox().intersect(&state.scissor), dest.format)
        };

        let mut dest = Pixmap::new(bbox, format);

        if !isolated {
            // Copy the last destination before this knockout group: the
            // nearest state below whose destination differs.
            let entry_dest = &self.stack[self.stack.len() - 2].dest;
            let backdrop = self.stack[..self.stack.len() - 1]
                .iter()
                .rev()
                .map(|s| &s.dest)
                .find(|d| !Rc::ptr_eq(d, entry_dest));

            if let Some(backdrop) = backdrop {
                dest.copy_rect(&backdrop.borrow(), bbox);
            }
        }

        let share_shape = self.top().blend == BlendMode::Normal && isolated;
        let shape = if share_shape {
            self.top().shape.clone()
        } else {
            Some(new_buf(Pixmap::new(bbox, PixFormat::Alpha)))
        };

        let top = self.top_mut();
        top.scissor = bbox;
        top.dest = new_buf(dest);
        top.shape = shape;
        top.blend = BlendMode::Normal;

        true
    }

    fn knockout_end(&mut self) {
        let Some(state) = self.stack.pop() else {
            log::warn!("unexpected knockout end");
            return;
        };

        let parent = self.top();
        let mode = parent.blend;
        let isolated = parent.isolated;
        let shapes_equal = buf_eq(&parent.shape, &state.shape);

        if mode == BlendMode::Normal && shapes_equal {
            blend::paint_pixmap(&mut parent.dest.borrow_mut(), &state.dest.borrow(), 255);
        } else {
            let shape = state.shape.as_ref().map(|s| s.borrow());
            blend::blend_pixmap(
                &mut parent.dest.borrow_mut(),
                &state.dest.borrow(),
                255,
                mode,
                isolated,
                shape.as_deref(),
            );
        }

        if !shapes_equal {
            if let (Some(parent_shape), Some(shape)) = (&parent.shape, &state.shape) {
                blend::paint_pixmap(&mut parent_shape.borrow_mut(), &shape.borrow(), 255);
            }
        }
    }

    /// Push a non-rectangular clip built from a coverage mask.
    fn push_mask_clip(&mut self, mask: CoverageMask) {
        self.push_state();

        let bbox = {
            let state = self.top();
            mask.bbox.intersect(&state.scissor)
        };

        let format = self.top().dest.borrow().format;

        let mut mask_pix = Pixmap::new(bbox, PixFormat::Alpha);
        blend::paint_mask_alpha(&mut mask_pix, &mask, 255);

        let has_shape = self.top().shape.is_some();

        let top = self.top_mut();
        top.mask = Some(new_buf(mask_pix));
        top.dest = new_buf(Pixmap::new(bbox, format));
        top.shape = has_shape.then(|| new_buf(Pixmap::new(bbox, PixFormat::Alpha)));
        top.isolated = true;
        top.scissor = bbox;
    }

    fn glyph_mask(&mut self, font: &Arc<Font>, glyph_id: u32, trm: Affine) -> Option<(Rc<Pixmap>, i32, i32)> {
        let rasterizer = match &mut self.rasterizer {
            Some(r) => r,
            None => {
                if !self.warned_no_glyphs {
                    log::warn!("no glyph rasterizer installed; text is not painted");
                    self.warned_no_glyphs = true;
                }
                return None;
            }
        };

        let [a, b, c, d, e, f] = trm.as_coeffs();
        let ix = e.floor();
        let iy = f.floor();

        // Quantize the fractional translation to the subpixel grid so
        // repeated glyphs hit the cache.
        let subx = ((e - ix) * HSUBPIX).floor() / HSUBPIX;
        let suby = ((f - iy) * VSUBPIX).floor() / VSUBPIX;

        let key = GlyphKey {
            font: font.id,
            glyph: glyph_id,
            matrix: [
                (a as f32).to_bits(),
                (b as f32).to_bits(),
                (c as f32).to_bits(),
                (d as f32).to_bits(),
            ],
            subpix: (
                (subx * HSUBPIX) as u8,
                (suby * VSUBPIX) as u8,
            ),
        };

        let entry = self.glyph_cache.entry(key).or_insert_with(|| {
            let local = Affine::new([a, b, c, d, subx, suby]);
            rasterizer
                .rasterize(font, glyph_id, local)
                .map(|g| Rc::new(g.pixmap))
        });

        entry
            .clone()
            .map(|mask| (mask, ix as i32, iy as i32))
    }

    fn draw_glyphs(&mut self, span: &TextSpan, ctm: Affine, color: &Color) {
        let n = self.top().dest.borrow().n();
        let premul = blend::premultiply(color.to_rgb(), color.alpha, n);
        let alpha255 = (color.alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        for glyph in &span.glyphs {
            if self.aborted() {
                return;
            }

            let trm = ctm * glyph.transform;

            let Some((mask, dx, dy)) = self.glyph_mask(&span.font, glyph.id, trm) else {
                continue;
            };

            let state = self.top();
            blend::paint_alpha_mask_color(
                &mut state.dest.borrow_mut(),
                &mask,
                dx,
                dy,
                &premul,
                &state.scissor,
            );

            if let Some(shape) = &state.shape {
                blend::paint_pixmap_shifted(
                    &mut shape.borrow_mut(),
                    &mask,
                    dx,
                    dy,
                    alpha255,
                    &state.scissor,
                );
            }
        }
    }

    fn accumulate_text_clip(&mut self, span: &TextSpan, ctm: Affine) {
        let Some(mask_buf) = self.top().mask.clone() else {
            return;
        };

        for glyph in &span.glyphs {
            if self.aborted() {
                return;
            }

            let trm = ctm * glyph.transform;

            let Some((mask, dx, dy)) = self.glyph_mask(&span.font, glyph.id, trm) else {
                continue;
            };

            let scissor = self.top().scissor;
            blend::paint_pixmap_shifted(&mut mask_buf.borrow_mut(), &mask, dx, dy, 255, &scissor);
        }
    }
}

impl Device for DrawDevice {
    fn fill_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine, color: &Color) {
        let mask = raster::fill_coverage(path, ctm, rule, &self.top().scissor);
        if mask.is_empty() {
            return;
        }

        let knockout = self.knockout_begin();
        self.paint_coverage(&mask, color);
        if knockout {
            self.knockout_end();
        }
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine, color: &Color) {
        let mask = raster::stroke_coverage(path, stroke, ctm, &self.top().scissor);
        if mask.is_empty() {
            return;
        }

        let knockout = self.knockout_begin();
        self.paint_coverage(&mask, color);
        if knockout {
            self.knockout_end();
        }
    }

    fn clip_path(&mut self, path: &BezPath, rule: FillRule, ctm: Affine) {
        // A pixel-aligned rectangle only narrows the scissor.
        if let Some(rect) = raster::path_as_aligned_rect(path, ctm) {
            self.push_state();
            let top = self.top_mut();
            top.scissor = top.scissor.intersect(&rect);
            top.mask = None;
            return;
        }

        let mask = raster::fill_coverage(path, ctm, rule, &self.top().scissor);
        self.push_mask_clip(mask);
    }

    fn clip_stroke_path(&mut self, path: &BezPath, stroke: &StrokeState, ctm: Affine) {
        let mask = raster::stroke_coverage(path, stroke, ctm, &self.top().scissor);
        self.push_mask_clip(mask);
    }

    fn fill_text(&mut self, text: &TextSpan, ctm: Affine, color: &Color) {
        let knockout = self.knockout_begin();
        self.draw_glyphs(text, ctm, color);
        if knockout {
            self.knockout_end();
        }
    }

    fn stroke_text(&mut self, text: &TextSpan, _stroke: &StrokeState, ctm: Affine, color: &Color) {
        // Stroked glyph outlines would come from the same collaborator;
        // the filled mask is the closest available rendering.
        let knockout = self.knockout_begin();
        self.draw_glyphs(text, ctm, color);
        if knockout {
            self.knockout_end();
        }
    }

    fn clip_text(&mut self, text: &TextSpan, ctm: Affine, accumulate: ClipAccumulate) {
        match accumulate {
            ClipAccumulate::Single | ClipAccumulate::Begin => {
                // The mask grows as glyphs accumulate, so it spans the
                // scissor rather than the glyph bounds.
                let scissor = self.top().scissor;
                self.push_mask_clip(CoverageMask {
                    bbox: scissor,
                    data: vec![0; scissor.width().max(0) as usize * scissor.height().max(0) as usize],
                });
                self.accumulate_text_clip(text, ctm);
            }
            ClipAccumulate::Continue => self.accumulate_text_clip(text, ctm),
        }
    }

    fn clip_stroke_text(&mut self, text: &TextSpan, _stroke: &StrokeState, ctm: Affine) {
        self.clip_text(text, ctm, ClipAccumulate::Single);
    }

    fn ignore_text(&mut self, _text: &TextSpan, _ctm: Affine) {}

    fn fill_image(&mut self, img: &Image, ctm: Affine, alpha: f32) {
        let knockout = self.knockout_begin();

        {
            let state = self.top();
            let mut dest = state.dest.borrow_mut();
            let mut shape = state.shape.as_ref().map(|s| s.borrow_mut());

            image::paint_image(
                &mut dest,
                shape.as_deref_mut(),
                img,
                ctm,
                alpha,
                &state.scissor,
            );
        }

        if knockout {
            self.knockout_end();
        }
    }

    fn fill_image_mask(&mut self, img: &Image, ctm: Affine, color: &Color) {
        let mask = image::mask_coverage(img, ctm, &self.top().scissor);
        if mask.is_empty() {
            return;
        }

        let knockout = self.knockout_begin();
        self.paint_coverage(&mask, color);
        if knockout {
            self.knockout_end();
        }
    }

    fn clip_image_mask(&mut self, img: &Image, ctm: Affine) {
        let mask = image::mask_coverage(img, ctm, &self.top().scissor);
        self.push_mask_clip(mask);
    }

    fn fill_shade(&mut self, shading: &Shading, ctm: Affine, alpha: f32) {
        let knockout = self.knockout_begin();

        {
            let state = self.top();
            let mut dest = state.dest.borrow_mut();
            let mut shape = state.shape.as_ref().map(|s| s.borrow_mut());
            let cookie = self.cookie.clone();

            shade::paint_shade(
                &mut dest,
                shape.as_deref_mut(),
                shading,
                ctm,
                alpha,
                &state.scissor,
                &mut |_batch| cookie.as_ref().is_some_and(|c| c.is_aborted()),
            );
        }

        if knockout {
            self.knockout_end();
        }
    }

    fn pop_clip(&mut self) {
        if self.stack.len() <= 1 {
            log::warn!("unexpected pop clip");
            return;
        }

        let state = self.stack.pop().unwrap();

        // A rectangular clip was only a scissor change.
        let Some(mask) = state.mask else {
            return;
        };

        let parent = self.top();
        blend::paint_pixmap_with_mask(
            &mut parent.dest.borrow_mut(),
            &state.dest.borrow(),
            &mask.borrow(),
        );

        if !buf_eq(&parent.shape, &state.shape) {
            if let (Some(parent_shape), Some(shape)) = (&parent.shape, &state.shape) {
                blend::paint_pixmap_with_mask(
                    &mut parent_shape.borrow_mut(),
                    &shape.borrow(),
                    &mask.borrow(),
                );
            }
        }
    }

    fn begin_mask(&mut self, area: Rect, luminosity: bool, backdrop: &Color) {
        self.push_state();

        let bbox = IRect::covering(&area).intersect(&self.top().scissor);

        let mut dest = Pixmap::new(bbox, PixFormat::Gray);

        if luminosity {
            let [r, g, b] = backdrop.to_rgb();
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            dest.clear_with((luma * 255.0 + 0.5) as u8);
        }

        let top = self.top_mut();
        top.scissor = bbox;
        top.dest = new_buf(dest);
        // The mask's own coverage is irrelevant; no shape plane inside.
        top.shape = None;
        top.luminosity = luminosity;
    }

    fn end_mask(&mut self) {
        if self.stack.len() <= 1 {
            log::warn!("unexpected end mask");
            return;
        }

        let luminosity = self.top().luminosity;

        // Convert the rendered gray scope into an alpha mask and reuse the
        // slot as a non-rectangular clip for what follows.
        let mask = self.top().dest.borrow().alpha_from_gray(luminosity);
        let bbox = mask.bbox();

        let parent_format = self.stack[self.stack.len() - 2].dest.borrow().format;
        let parent_has_shape = self.stack[self.stack.len() - 2].shape.is_some();

        let top = self.top_mut();
        top.mask = Some(new_buf(mask));
        top.dest = new_buf(Pixmap::new(bbox, parent_format));
        top.shape = parent_has_shape.then(|| new_buf(Pixmap::new(bbox, PixFormat::Alpha)));
        top.isolated = true;
        top.scissor = bbox;
    }

    fn begin_group(
        &mut self,
        area: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) {
        let wrapped = self.knockout_begin();
        let _ = wrapped;

        self.push_state();

        let bbox = IRect::covering(&area).intersect(&self.top().scissor);
        let format = self.top().dest.borrow().format;

        let mut dest = Pixmap::new(bbox, format);

        if !isolated {
            let parent = &self.stack[self.stack.len() - 2];
            dest.copy_rect(&parent.dest.borrow(), bbox);
        }

        // A plain group can render into any existing shape plane; other
        // groups need their own coverage to composite correctly.
        let share_shape = blend == BlendMode::Normal && alpha == 1.0 && isolated;
        let shape = if share_shape {
            self.stack[self.stack.len() - 2].shape.clone()
        } else {
            Some(new_buf(Pixmap::new(bbox, PixFormat::Alpha)))
        };

        let top = self.top_mut();
        top.scissor = bbox;
        top.dest = new_buf(dest);
        top.shape = shape;
        top.blend = blend;
        top.isolated = isolated;
        top.knockout = knockout;
        top.alpha = alpha;
    }

    fn end_group(&mut self) {
        if self.stack.len() <= 1 {
            log::warn!("unexpected end group");
            return;
        }

        let state = self.stack.pop().unwrap();
        let alpha255 = (state.alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        {
            let parent = self.top();
            let shapes_equal = buf_eq(&parent.shape, &state.shape);

            if state.blend == BlendMode::Normal && shapes_equal {
                blend::paint_pixmap(
                    &mut parent.dest.borrow_mut(),
                    &state.dest.borrow(),
                    alpha255,
                );
            } else {
                let shape = state.shape.as_ref().map(|s| s.borrow());
                blend::blend_pixmap(
                    &mut parent.dest.borrow_mut(),
                    &state.dest.borrow(),
                    alpha255,
                    state.blend,
                    state.isolated,
                    shape.as_deref(),
                );
            }

            if !shapes_equal {
                if let (Some(parent_shape), Some(shape)) = (&parent.shape, &state.shape) {
                    blend::paint_pixmap(
                        &mut parent_shape.borrow_mut(),
                        &shape.borrow(),
                        alpha255,
                    );
                }
            }
        }

        if self.top().knockout {
            self.knockout_end();
        }
    }

    fn begin_tile(&mut self, area: Rect, view: Rect, xstep: f32, ystep: f32, ctm: Affine) {
        let wrapped = self.knockout_begin();
        let _ = wrapped;

        self.push_state();

        // The tile renders at full size; clipping happens at replay.
        let bbox = IRect::covering(&ctm.transform_rect_bbox(view));
        let format = self.top().dest.borrow().format;
        let has_shape = self.top().shape.is_some();

        let top = self.top_mut();
        top.scissor = bbox;
        top.dest = new_buf(Pixmap::new(bbox, format));
        top.shape = has_shape.then(|| new_buf(Pixmap::new(bbox, PixFormat::Alpha)));
        top.isolated = true;
        top.ctm = ctm;
        top.xstep = xstep;
        top.ystep = ystep;
        top.area = area;
        top.view = view;
    }

    fn end_tile(&mut self) {
        if self.stack.len() <= 1 {
            log::warn!("unexpected end tile");
            return;
        }

        let state = self.stack.pop().unwrap();

        let xstep = state.xstep as f64;
        let ystep = state.ystep as f64;

        if xstep <= 0.0 || ystep <= 0.0 || state.ctm.determinant().abs() < 1e-12 {
            if self.top().knockout {
                self.knockout_end();
            }
            return;
        }

        // Tile indices that cover the parent scissor: transform the
        // scissor into pattern space and slide the cell across it. The
        // origin need not be grid-aligned; the range covers it regardless.
        let parent_scissor = self.top().scissor;
        let pattern_rect = state
            .ctm
            .inverse()
            .transform_rect_bbox(parent_scissor.to_rect());

        let x0 = ((pattern_rect.x0 - state.view.x1) / xstep).ceil() as i64;
        let x1 = ((pattern_rect.x1 - state.view.x0) / xstep).floor() as i64;
        let y0 = ((pattern_rect.y0 - state.view.y1) / ystep).ceil() as i64;
        let y1 = ((pattern_rect.y1 - state.view.y0) / ystep).floor() as i64;

        let count = (x1 - x0 + 1).max(0) * (y1 - y0 + 1).max(0);
        if count > MAX_TILES {
            log::warn!("pattern requires {count} tiles; refusing");
            if self.top().knockout {
                self.knockout_end();
            }
            return;
        }

        let origin = state.ctm * Point::ZERO;

        for j in y0..=y1 {
            for i in x0..=x1 {
                if self.aborted() {
                    break;
                }

                let moved = state.ctm * Point::new(i as f64 * xstep, j as f64 * ystep);
                let dx = (moved.x - origin.x).round() as i32;
                let dy = (moved.y - origin.y).round() as i32;

                let parent = self.top();
                blend::paint_pixmap_shifted(
                    &mut parent.dest.borrow_mut(),
                    &state.dest.borrow(),
                    dx,
                    dy,
                    255,
                    &parent_scissor,
                );

                if let (Some(parent_shape), Some(shape)) = (&parent.shape, &state.shape) {
                    blend::paint_pixmap_shifted(
                        &mut parent_shape.borrow_mut(),
                        &shape.borrow(),
                        dx,
                        dy,
                        255,
                        &parent_scissor,
                    );
                }
            }
        }

        if self.top().knockout {
            self.knockout_end();
        }
    }

    fn free_user(&mut self) {
        if self.stack.len() > 1 {
            log::warn!("items left on stack in draw device: {}", self.stack.len() - 1);
            self.stack.truncate(1);
        }

        self.glyph_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Shape;

    fn rgb_at(pix: &Pixmap, x: i32, y: i32) -> [u8; 4] {
        let off = pix.offset_of(x, y).unwrap();
        let d = pix.data();
        [d[off], d[off + 1], d[off + 2], d[off + 3]]
    }

    fn white_dest(w: i32, h: i32) -> Pixmap {
        let mut pix = Pixmap::new(IRect::new(0, 0, w, h), PixFormat::Rgb);
        pix.data_mut().fill(255);
        pix
    }

    fn rect_path(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
        Rect::new(x0, y0, x1, y1).to_path(0.1)
    }

    #[test]
    fn fill_paints_gray_rectangle() {
        let mut dev = DrawDevice::new(white_dest(20, 20));

        dev.fill_path(
            &rect_path(5.0, 5.0, 15.0, 15.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::gray(0.5),
        );

        let pix = dev.into_pixmap();
        let inside = rgb_at(&pix, 10, 10);
        assert!((inside[0] as i32 - 128).abs() <= 1);
        assert_eq!(rgb_at(&pix, 2, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn rectangular_clip_narrows_without_mask() {
        let mut dev = DrawDevice::new(white_dest(20, 20));

        dev.clip_path(&rect_path(0.0, 0.0, 10.0, 10.0), FillRule::NonZero, Affine::IDENTITY);
        assert_eq!(dev.stack_depth(), 2);
        assert!(dev.top().mask.is_none());

        dev.fill_path(
            &rect_path(0.0, 0.0, 20.0, 20.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::rgb(1.0, 0.0, 0.0),
        );

        dev.pop_clip();
        assert_eq!(dev.stack_depth(), 1);

        let pix = dev.into_pixmap();
        assert_eq!(rgb_at(&pix, 5, 5)[0], 255);
        assert_eq!(rgb_at(&pix, 5, 5)[1], 0);
        // Outside the clip the fill never landed.
        assert_eq!(rgb_at(&pix, 15, 15), [255, 255, 255, 255]);
    }

    #[test]
    fn nonrect_clip_composites_through_mask() {
        let mut dev = DrawDevice::new(white_dest(20, 20));

        // A triangle is not a rectangle, so this clip allocates buffers.
        let mut tri = BezPath::new();
        tri.move_to((0.0, 0.0));
        tri.line_to((20.0, 0.0));
        tri.line_to((0.0, 20.0));
        tri.close_path();

        dev.clip_path(&tri, FillRule::NonZero, Affine::IDENTITY);
        assert!(dev.top().mask.is_some());

        dev.fill_path(
            &rect_path(0.0, 0.0, 20.0, 20.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::gray(0.0),
        );

        dev.pop_clip();
        let pix = dev.into_pixmap();

        // Inside the triangle: black. Far corner: untouched white.
        assert_eq!(rgb_at(&pix, 2, 2)[0], 0);
        assert_eq!(rgb_at(&pix, 18, 18), [255, 255, 255, 255]);
    }

    #[test]
    fn isolated_normal_group_is_transparent_to_output() {
        // begin_group/fill/end_group with defaults must equal a plain fill.
        let direct = {
            let mut dev = DrawDevice::new(white_dest(10, 10));
            dev.fill_path(
                &rect_path(2.0, 2.0, 8.0, 8.0),
                FillRule::NonZero,
                Affine::IDENTITY,
                &Color::rgb(0.2, 0.4, 0.6),
            );
            dev.into_pixmap()
        };

        let grouped = {
            let mut dev = DrawDevice::new(white_dest(10, 10));
            dev.begin_group(
                Rect::new(0.0, 0.0, 10.0, 10.0),
                true,
                false,
                BlendMode::Normal,
                1.0,
            );
            dev.fill_path(
                &rect_path(2.0, 2.0, 8.0, 8.0),
                FillRule::NonZero,
                Affine::IDENTITY,
                &Color::rgb(0.2, 0.4, 0.6),
            );
            dev.end_group();
            assert_eq!(dev.stack_depth(), 1);
            dev.into_pixmap()
        };

        for (a, b) in direct.data().iter().zip(grouped.data().iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1);
        }
    }

    #[test]
    fn group_alpha_fades_content() {
        let mut dev = DrawDevice::new(white_dest(10, 10));

        dev.begin_group(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            true,
            false,
            BlendMode::Normal,
            0.5,
        );
        dev.fill_path(
            &rect_path(0.0, 0.0, 10.0, 10.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::gray(0.0),
        );
        dev.end_group();

        let pix = dev.into_pixmap();
        // Half black over white is mid-gray.
        assert!((rgb_at(&pix, 5, 5)[0] as i32 - 128).abs() <= 2);
    }

    #[test]
    fn soft_mask_gates_subsequent_paint() {
        let mut dev = DrawDevice::new(white_dest(10, 10));

        dev.begin_mask(Rect::new(0.0, 0.0, 10.0, 10.0), true, &Color::gray(0.0));
        // Luminosity mask: white square on the left half.
        dev.fill_path(
            &rect_path(0.0, 0.0, 5.0, 10.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::gray(1.0),
        );
        dev.end_mask();

        dev.fill_path(
            &rect_path(0.0, 0.0, 10.0, 10.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::rgb(1.0, 0.0, 0.0),
        );

        dev.pop_clip();
        assert_eq!(dev.stack_depth(), 1);

        let pix = dev.into_pixmap();
        // Left half: red shows through the mask. Right half: backdrop.
        assert_eq!(rgb_at(&pix, 2, 5)[0], 255);
        assert_eq!(rgb_at(&pix, 2, 5)[1], 0);
        assert_eq!(rgb_at(&pix, 8, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn tiles_cover_scissor_off_grid() {
        let mut dev = DrawDevice::new(white_dest(100, 100));

        let ctm = Affine::translate((5.0, 7.0));
        dev.begin_tile(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Rect::new(0.0, 0.0, 20.0, 20.0),
            20.0,
            20.0,
            ctm,
        );

        // One full-cell black square per tile.
        dev.fill_path(
            &rect_path(0.0, 0.0, 20.0, 20.0),
            FillRule::NonZero,
            ctm,
            &Color::gray(0.0),
        );

        dev.end_tile();
        assert_eq!(dev.stack_depth(), 1);

        let pix = dev.into_pixmap();

        // Every pixel of the scissor is covered by some tile.
        for y in [0, 10, 50, 99] {
            for x in [0, 10, 50, 99] {
                assert_eq!(rgb_at(&pix, x, y)[0], 0, "uncovered pixel at {x},{y}");
            }
        }
    }

    #[test]
    fn knockout_group_brackets_each_paint() {
        let mut dev = DrawDevice::new(white_dest(10, 10));

        dev.begin_group(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            true,
            true,
            BlendMode::Normal,
            1.0,
        );

        // Each fill runs through its own intermediate knockout layer; the
        // stack must return to the group level after every paint.
        let depth_in_group = dev.stack_depth();

        dev.fill_path(
            &rect_path(0.0, 0.0, 10.0, 10.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::rgb(1.0, 0.0, 0.0).with_alpha(0.5),
        );
        assert_eq!(dev.stack_depth(), depth_in_group);

        dev.fill_path(
            &rect_path(0.0, 0.0, 10.0, 10.0),
            FillRule::NonZero,
            Affine::IDENTITY,
            &Color::rgb(0.0, 0.0, 1.0).with_alpha(0.5),
        );
        assert_eq!(dev.stack_depth(), depth_in_group);

        dev.end_group();
        assert_eq!(dev.stack_depth(), 1);

        // The content reached the page.
        let pix = dev.into_pixmap();
        let px = rgb_at(&pix, 5, 5);
        assert_ne!(px, [255, 255, 255, 255]);
        assert!(px[2] > 100, "blue should dominate: {px:?}");
    }

    #[test]
    fn scope_balance_is_observable() {
        let mut dev = DrawDevice::new(white_dest(10, 10));
        let before = dev.stack_depth();

        dev.clip_path(&rect_path(1.0, 1.0, 9.0, 9.0), FillRule::NonZero, Affine::IDENTITY);
        dev.begin_group(Rect::new(0.0, 0.0, 10.0, 10.0), true, false, BlendMode::Normal, 1.0);
        dev.end_group();
        dev.pop_clip();

        assert_eq!(dev.stack_depth(), before);
    }
}
