//! Executing page content streams against a device.

use crate::color::{Color, ColorSpace};
use crate::cookie::Cookie;
use crate::device::{BlendMode, ClipAccumulate, Device, FillRule, Glyph, TextSpan};
use crate::font::Font;
use crate::image;
use crate::shading::Shading;
use crate::state::GraphicsState;
use kurbo::{Affine, BezPath, Cap, Join, Point, Rect, Shape};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tarn_syntax::content::{ContentItem, ContentLexer};
use tarn_syntax::error::{Error, Result};
use tarn_syntax::geom::normalize_rect;
use tarn_syntax::object::name::keys;
use tarn_syntax::object::{Dict, Name, Value};
use tarn_syntax::page::Page;
use tarn_syntax::Document;

/// Nested form XObjects beyond this depth are ignored.
const MAX_FORM_DEPTH: usize = 24;

/// Run a page's content against a device.
///
/// The device sees a balanced scope stack on every exit path: normal
/// completion, cookie abort (which returns `Ok`), and structural errors
/// (which the caller of `run_page` handles).
pub fn run_page(
    doc: &Document,
    page: &Page,
    device: &mut dyn Device,
    ctm: Affine,
    cookie: Option<&Cookie>,
) -> Result<()> {
    let content = page.content(doc)?;

    let mut exec = Executor::new(doc, device, ctm, cookie);
    let result = exec.execute(&content, &page.resources());
    exec.finish();

    match result {
        Err(Error::Cancelled) => Ok(()),
        other => other,
    }
}

/// Run arbitrary content-stream bytes against a device (used for patterns
/// and annotations appearance streams).
pub fn run_content(
    doc: &Document,
    content: &[u8],
    resources: &Dict,
    device: &mut dyn Device,
    ctm: Affine,
    cookie: Option<&Cookie>,
) -> Result<()> {
    let mut exec = Executor::new(doc, device, ctm, cookie);
    let result = exec.execute(content, resources);
    exec.finish();

    match result {
        Err(Error::Cancelled) => Ok(()),
        other => other,
    }
}

struct Executor<'a> {
    doc: &'a Document,
    device: &'a mut dyn Device,
    cookie: Option<&'a Cookie>,
    /// Current state on top; never empty.
    stack: Vec<GraphicsState>,
    /// The page's initial matrix; patterns anchor to it.
    base_ctm: Affine,
    /// Device clip scopes currently open.
    open_clips: usize,
    path: BezPath,
    sub_path_start: Point,
    last_point: Point,
    pending_clip: Option<FillRule>,
    text_matrix: Affine,
    line_matrix: Affine,
    /// Whether the current text object already opened a clip scope.
    text_clip_open: bool,
    fonts: FxHashMap<Vec<u8>, Arc<Font>>,
    form_depth: usize,
    /// Nesting depth of hidden optional-content sections.
    hidden: usize,
    /// Marked-content nesting inside the hidden section.
    hidden_nesting: usize,
}

impl<'a> Executor<'a> {
    fn new(
        doc: &'a Document,
        device: &'a mut dyn Device,
        ctm: Affine,
        cookie: Option<&'a Cookie>,
    ) -> Self {
        Self {
            doc,
            device,
            cookie,
            stack: vec![GraphicsState::new(ctm)],
            base_ctm: ctm,
            open_clips: 0,
            path: BezPath::new(),
            sub_path_start: Point::ZERO,
            last_point: Point::ZERO,
            pending_clip: None,
            text_matrix: Affine::IDENTITY,
            line_matrix: Affine::IDENTITY,
            text_clip_open: false,
            fonts: FxHashMap::default(),
            form_depth: 0,
            hidden: 0,
            hidden_nesting: 0,
        }
    }

    fn gs(&self) -> &GraphicsState {
        self.stack.last().unwrap()
    }

    fn gs_mut(&mut self) -> &mut GraphicsState {
        self.stack.last_mut().unwrap()
    }

    fn visible(&self) -> bool {
        self.hidden == 0
    }

    /// Close every scope this run opened and fire the teardown hook. Runs
    /// on every exit path, so the device never sees an unbalanced stack.
    fn finish(&mut self) {
        if self.stack.len() > 1 {
            self.doc
                .context()
                .warn(&format!("content left {} states unrestored", self.stack.len() - 1));
        }

        while self.open_clips > 0 {
            self.device.pop_clip();
            self.open_clips -= 1;
        }

        self.device.free_user();
    }

    fn execute(&mut self, content: &[u8], resources: &Dict) -> Result<()> {
        let mut lexer = ContentLexer::new(content);
        let mut operands: SmallVec<[Value; 8]> = SmallVec::new();

        while let Some(item) = lexer.next_item() {
            match item {
                ContentItem::Operand(value) => {
                    if operands.len() < 32 {
                        operands.push(value);
                    }
                }
                ContentItem::Operator(op) => {
                    self.operator(op, &operands, resources, &mut lexer)?;
                    operands.clear();

                    if let Some(cookie) = self.cookie {
                        cookie.tick();
                        if cookie.is_aborted() {
                            return Err(Error::Cancelled);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn operator(
        &mut self,
        op: &[u8],
        args: &[Value],
        resources: &Dict,
        lexer: &mut ContentLexer<'_>,
    ) -> Result<()> {
        let f = |i: usize| args.get(i).map(|v| v.as_real()).unwrap_or(0.0);
        let fd = |i: usize| f(i) as f64;

        // Inside a hidden optional-content section only the marked-content
        // nesting is tracked; nothing draws and no state changes apply.
        if self.hidden > 0 {
            match op {
                b"BMC" | b"BDC" => self.hidden_nesting += 1,
                b"EMC" => {
                    if self.hidden_nesting == 0 {
                        self.hidden -= 1;
                    } else {
                        self.hidden_nesting -= 1;
                    }
                }
                _ => {}
            }
            return Ok(());
        }

        match op {
            // -- Graphics state ------------------------------------------
            b"q" => {
                let mut saved = self.gs().clone();
                saved.clip_base = self.open_clips;
                self.stack.push(saved);
            }
            b"Q" => {
                if self.stack.len() > 1 {
                    let popped = self.stack.pop().unwrap();
                    while self.open_clips > popped.clip_base {
                        self.device.pop_clip();
                        self.open_clips -= 1;
                    }
                } else {
                    self.doc.context().warn("unbalanced restore in content stream");
                }
            }
            b"cm" => {
                let m = Affine::new([fd(0), fd(1), fd(2), fd(3), fd(4), fd(5)]);
                self.gs_mut().ctm *= m;
            }
            b"w" => self.gs_mut().stroke.line_width = f(0),
            b"J" => {
                self.gs_mut().stroke.line_cap = match args.first().map(|v| v.as_int()) {
                    Some(1) => Cap::Round,
                    Some(2) => Cap::Square,
                    _ => Cap::Butt,
                }
            }
            b"j" => {
                self.gs_mut().stroke.line_join = match args.first().map(|v| v.as_int()) {
                    Some(1) => Join::Round,
                    Some(2) => Join::Bevel,
                    _ => Join::Miter,
                }
            }
            b"M" => self.gs_mut().stroke.miter_limit = f(0),
            b"d" => {
                let dashes = args
                    .first()
                    .and_then(|v| v.as_array())
                    .map(|a| a.to_floats())
                    .unwrap_or_default();
                self.gs_mut().stroke.dash_array = dashes.into_iter().collect();
                self.gs_mut().stroke.dash_offset = f(1);
            }
            b"ri" | b"i" => {}
            b"gs" => {
                let name = args.first().map(|v| v.as_name()).unwrap_or_else(Name::empty);
                self.ext_g_state(&name, resources)?;
            }

            // -- Path construction ---------------------------------------
            b"m" => {
                let p = Point::new(fd(0), fd(1));
                self.path.move_to(p);
                self.sub_path_start = p;
                self.last_point = p;
            }
            b"l" => {
                let p = Point::new(fd(0), fd(1));
                self.path.line_to(p);
                self.last_point = p;
            }
            b"c" => {
                let (p1, p2, p3) = (
                    Point::new(fd(0), fd(1)),
                    Point::new(fd(2), fd(3)),
                    Point::new(fd(4), fd(5)),
                );
                self.path.curve_to(p1, p2, p3);
                self.last_point = p3;
            }
            b"v" => {
                let p1 = self.last_point;
                let (p2, p3) = (Point::new(fd(0), fd(1)), Point::new(fd(2), fd(3)));
                self.path.curve_to(p1, p2, p3);
                self.last_point = p3;
            }
            b"y" => {
                let (p2, p3) = (Point::new(fd(0), fd(1)), Point::new(fd(2), fd(3)));
                self.path.curve_to(p2, p3, p3);
                self.last_point = p3;
            }
            b"h" => {
                self.path.close_path();
                self.last_point = self.sub_path_start;
            }
            b"re" => {
                let rect = Rect::new(fd(0), fd(1), fd(0) + fd(2), fd(1) + fd(3));
                self.path.extend(normalize_rect(&rect).to_path(0.1));
                self.last_point = rect.origin();
                self.sub_path_start = rect.origin();
            }

            // -- Path painting -------------------------------------------
            b"S" => self.paint_path(false, true, None, resources)?,
            b"s" => {
                self.path.close_path();
                self.paint_path(false, true, None, resources)?;
            }
            b"f" | b"F" => self.paint_path(true, false, Some(FillRule::NonZero), resources)?,
            b"f*" => self.paint_path(true, false, Some(FillRule::EvenOdd), resources)?,
            b"B" => self.paint_path(true, true, Some(FillRule::NonZero), resources)?,
            b"B*" => self.paint_path(true, true, Some(FillRule::EvenOdd), resources)?,
            b"b" => {
                self.path.close_path();
                self.paint_path(true, true, Some(FillRule::NonZero), resources)?;
            }
            b"b*" => {
                self.path.close_path();
                self.paint_path(true, true, Some(FillRule::EvenOdd), resources)?;
            }
            b"n" => self.paint_path(false, false, None, resources)?,
            b"W" => self.pending_clip = Some(FillRule::NonZero),
            b"W*" => self.pending_clip = Some(FillRule::EvenOdd),

            // -- Colour --------------------------------------------------
            b"g" => self.set_color(false, ColorSpace::DeviceGray, args),
            b"G" => self.set_color(true, ColorSpace::DeviceGray, args),
            b"rg" => self.set_color(false, ColorSpace::DeviceRgb, args),
            b"RG" => self.set_color(true, ColorSpace::DeviceRgb, args),
            b"k" => self.set_color(false, ColorSpace::DeviceCmyk, args),
            b"K" => self.set_color(true, ColorSpace::DeviceCmyk, args),
            b"cs" => self.set_color_space(false, args, resources),
            b"CS" => self.set_color_space(true, args, resources),
            b"sc" | b"scn" => self.set_color_components(false, args),
            b"SC" | b"SCN" => self.set_color_components(true, args),

            // -- Shading -------------------------------------------------
            b"sh" => {
                let name = args.first().map(|v| v.as_name()).unwrap_or_else(Name::empty);
                let shade = self.lookup(resources, keys::SHADING, &name)?;
                let shading = Shading::load(self.doc, &shade)?;

                if self.visible() {
                    let alpha = self.gs().fill_alpha;
                    let ctm = self.gs().ctm;
                    self.device.fill_shade(&shading, ctm, alpha);
                }
            }

            // -- XObjects and inline images ------------------------------
            b"Do" => {
                let name = args.first().map(|v| v.as_name()).unwrap_or_else(Name::empty);
                self.x_object(&name, resources)?;
            }
            b"BI" => {
                if let Some((dict, data)) = lexer.read_inline_image() {
                    self.inline_image(&dict, data);
                } else {
                    self.doc.context().warn("unterminated inline image");
                }
            }

            // -- Text ----------------------------------------------------
            b"BT" => {
                self.text_matrix = Affine::IDENTITY;
                self.line_matrix = Affine::IDENTITY;
                self.text_clip_open = false;
            }
            b"ET" => {}
            b"Tc" => self.gs_mut().text.char_space = f(0),
            b"Tw" => self.gs_mut().text.word_space = f(0),
            b"Tz" => self.gs_mut().text.h_scale = f(0) / 100.0,
            b"TL" => self.gs_mut().text.leading = f(0),
            b"Ts" => self.gs_mut().text.rise = f(0),
            b"Tr" => self.gs_mut().text.render_mode = args.first().map(|v| v.as_int()).unwrap_or(0),
            b"Tf" => {
                let name = args.first().map(|v| v.as_name()).unwrap_or_else(Name::empty);
                self.gs_mut().text.size = f(1);
                self.set_font(&name, resources)?;
            }
            b"Td" => self.next_line(fd(0), fd(1)),
            b"TD" => {
                self.gs_mut().text.leading = -f(1);
                self.next_line(fd(0), fd(1));
            }
            b"Tm" => {
                let m = Affine::new([fd(0), fd(1), fd(2), fd(3), fd(4), fd(5)]);
                self.text_matrix = m;
                self.line_matrix = m;
            }
            b"T*" => {
                let leading = self.gs().text.leading as f64;
                self.next_line(0.0, -leading);
            }
            b"Tj" => {
                let text = args.first().map(|v| v.as_string()).unwrap_or_default();
                self.show_text(&text)?;
            }
            b"'" => {
                let leading = self.gs().text.leading as f64;
                self.next_line(0.0, -leading);
                let text = args.first().map(|v| v.as_string()).unwrap_or_default();
                self.show_text(&text)?;
            }
            b"\"" => {
                self.gs_mut().text.word_space = f(0);
                self.gs_mut().text.char_space = f(1);
                let leading = self.gs().text.leading as f64;
                self.next_line(0.0, -leading);
                let text = args.get(2).map(|v| v.as_string()).unwrap_or_default();
                self.show_text(&text)?;
            }
            b"TJ" => {
                let Some(array) = args.first().and_then(|v| v.as_array()) else {
                    return Ok(());
                };

                for i in 0..array.len() {
                    match array.get_raw(i) {
                        Value::String(s) => self.show_text(&s)?,
                        v @ (Value::Int(_) | Value::Real(_)) => {
                            let adjust = -v.as_real() / 1000.0
                                * self.gs().text.size
                                * self.gs().text.h_scale;
                            self.text_matrix *= Affine::translate((adjust as f64, 0.0));
                        }
                        _ => {}
                    }
                }
            }

            // -- Marked content ------------------------------------------
            b"BDC" => {
                if self.begins_hidden_content(args, resources) {
                    self.hidden = 1;
                    self.hidden_nesting = 0;
                }
            }
            b"BMC" | b"MP" | b"DP" | b"EMC" => {}

            // Type 3 glyph metrics; nothing to do at page level.
            b"d0" | b"d1" => {}

            other => {
                self.doc.context().warn(&format!(
                    "unknown content operator {}",
                    String::from_utf8_lossy(other)
                ));
            }
        }

        Ok(())
    }

    // -- Colour helpers --------------------------------------------------

    fn set_color(&mut self, stroking: bool, space: ColorSpace, args: &[Value]) {
        let components: SmallVec<[f32; 4]> = args
            .iter()
            .take(space.n())
            .map(|v| v.as_real())
            .collect();

        let color = Color {
            space,
            components,
            alpha: 1.0,
        };

        if stroking {
            self.gs_mut().stroke_color = color;
            self.gs_mut().stroke_pattern = None;
        } else {
            self.gs_mut().fill_color = color;
            self.gs_mut().fill_pattern = None;
        }
    }

    fn set_color_space(&mut self, stroking: bool, args: &[Value], resources: &Dict) {
        let operand = args.first().cloned().unwrap_or(Value::Null);

        // /Pattern defers the actual paint source to scn.
        if operand.as_name().as_ref() == keys::PATTERN {
            if stroking {
                self.gs_mut().stroke_pattern = None;
            } else {
                self.gs_mut().fill_pattern = None;
            }
            return;
        }

        // A named space may live in the resource dictionary.
        let resolved = match &operand {
            Value::Name(n) if !is_device_space(n) => resources
                .get(keys::COLORSPACE)
                .as_dict()
                .map(|d| d.get(n))
                .unwrap_or(operand.clone()),
            _ => operand.clone(),
        };

        let space = ColorSpace::from_value(&resolved);
        let components: SmallVec<[f32; 4]> = std::iter::repeat(0.0).take(space.n()).collect();

        let color = Color {
            space,
            components,
            alpha: 1.0,
        };

        if stroking {
            self.gs_mut().stroke_color = color;
        } else {
            self.gs_mut().fill_color = color;
        }
    }

    fn set_color_components(&mut self, stroking: bool, args: &[Value]) {
        // A trailing name selects a pattern; numbers set components.
        if let Some(Value::Name(name)) = args.last() {
            if stroking {
                self.gs_mut().stroke_pattern = Some(name.clone());
            } else {
                self.gs_mut().fill_pattern = Some(name.clone());
            }
            return;
        }

        let components: SmallVec<[f32; 4]> = args.iter().map(|v| v.as_real()).collect();

        if stroking {
            let space = self.gs().stroke_color.space;
            self.gs_mut().stroke_color = Color {
                space,
                components,
                alpha: 1.0,
            };
            self.gs_mut().stroke_pattern = None;
        } else {
            let space = self.gs().fill_color.space;
            self.gs_mut().fill_color = Color {
                space,
                components,
                alpha: 1.0,
            };
            self.gs_mut().fill_pattern = None;
        }
    }

    // -- Resource lookup -------------------------------------------------

    fn lookup(&self, resources: &Dict, category: &[u8], name: &Name) -> Result<Value> {
        let value = resources
            .get(category)
            .as_dict()
            .map(|d| d.get_raw(name).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);

        if matches!(value, Value::Null) {
            return Err(Error::missing_resource(format!(
                "{}/{}",
                String::from_utf8_lossy(category),
                name.as_str()
            )));
        }

        Ok(value)
    }

    fn ext_g_state(&mut self, name: &Name, resources: &Dict) -> Result<()> {
        let gs_dict = self
            .lookup(resources, keys::EXT_G_STATE, name)?
            .as_dict()
            .unwrap_or_default();

        for (key, value) in gs_dict.entries() {
            match &*key {
                b"LW" => self.gs_mut().stroke.line_width = value.as_real(),
                b"LC" => {
                    self.gs_mut().stroke.line_cap = match value.as_int() {
                        1 => Cap::Round,
                        2 => Cap::Square,
                        _ => Cap::Butt,
                    }
                }
                b"LJ" => {
                    self.gs_mut().stroke.line_join = match value.as_int() {
                        1 => Join::Round,
                        2 => Join::Bevel,
                        _ => Join::Miter,
                    }
                }
                b"ML" => self.gs_mut().stroke.miter_limit = value.as_real(),
                b"CA" => self.gs_mut().stroke_alpha = value.as_real().clamp(0.0, 1.0),
                b"ca" => self.gs_mut().fill_alpha = value.as_real().clamp(0.0, 1.0),
                b"BM" => {
                    let name = match value.resolve() {
                        Value::Array(a) => a.get(0).as_name(),
                        v => v.as_name(),
                    };
                    self.gs_mut().blend = BlendMode::from_name(&name);
                }
                b"D" => {
                    if let Some(array) = value.as_array() {
                        let dashes = array.get(0).as_array().map(|a| a.to_floats());
                        self.gs_mut().stroke.dash_array =
                            dashes.unwrap_or_default().into_iter().collect();
                        self.gs_mut().stroke.dash_offset = array.get(1).as_real();
                    }
                }
                b"Font" => {
                    if let Some(array) = value.as_array() {
                        self.gs_mut().text.size = array.get(1).as_real();
                    }
                }
                b"SMask" => match value.resolve() {
                    Value::Dict(mask) => self.soft_mask(&mask)?,
                    _ => {}
                },
                _ => {}
            }
        }

        Ok(())
    }

    // -- Painting --------------------------------------------------------

    fn paint_path(
        &mut self,
        fill: bool,
        stroke: bool,
        rule: Option<FillRule>,
        resources: &Dict,
    ) -> Result<()> {
        let ctm = self.gs().ctm;

        if self.visible() {
            if fill {
                if let Some(pattern) = self.gs().fill_pattern.clone() {
                    self.fill_with_pattern(&pattern, rule.unwrap_or(FillRule::NonZero), resources)?;
                } else {
                    let color = self.gs().fill_color.clone().with_alpha(self.gs().fill_alpha);
                    self.device
                        .fill_path(&self.path, rule.unwrap_or(FillRule::NonZero), ctm, &color);
                }
            }

            if stroke {
                let color = self
                    .gs()
                    .stroke_color
                    .clone()
                    .with_alpha(self.gs().stroke_alpha);
                let stroke_state = self.gs().stroke.clone();
                self.device.stroke_path(&self.path, &stroke_state, ctm, &color);
            }
        }

        if let Some(rule) = self.pending_clip.take() {
            self.device.clip_path(&self.path, rule, ctm);
            self.open_clips += 1;
        }

        self.path = BezPath::new();
        Ok(())
    }

    fn fill_with_pattern(&mut self, name: &Name, rule: FillRule, resources: &Dict) -> Result<()> {
        let pattern = self.lookup(resources, keys::PATTERN, name)?;

        let Some(dict) = pattern.resolve().as_dict() else {
            self.doc.context().warn("pattern is not a dictionary");
            return Ok(());
        };

        let matrix = read_matrix(&dict).unwrap_or(Affine::IDENTITY);
        // Pattern space anchors to the page, not to the current transform.
        let pattern_ctm = self.base_ctm * matrix;
        let ctm = self.gs().ctm;

        // The pattern paints only where the shape would have painted.
        self.device.clip_path(&self.path, rule, ctm);

        let result = match dict.get(keys::PATTERN_TYPE).as_int() {
            2 => {
                let shading = Shading::load(self.doc, &dict.get_raw(keys::SHADING).unwrap_or(Value::Null))?;
                let alpha = self.gs().fill_alpha;
                self.device.fill_shade(&shading, pattern_ctm, alpha);
                Ok(())
            }
            _ => self.run_tiling_pattern(&pattern, &dict, pattern_ctm),
        };

        self.device.pop_clip();
        result
    }

    fn run_tiling_pattern(
        &mut self,
        pattern: &Value,
        dict: &Dict,
        pattern_ctm: Affine,
    ) -> Result<()> {
        let bbox = read_rect(dict, keys::BBOX)
            .ok_or_else(|| Error::parse("tiling pattern lacks a BBox".into()))?;

        let mut xstep = dict.get(keys::X_STEP).as_real();
        let mut ystep = dict.get(keys::Y_STEP).as_real();

        // Negative steps are refused before any tiling begins.
        if xstep < 0.0 || ystep < 0.0 {
            return Err(Error::parse(format!(
                "tiling pattern has negative steps {xstep}/{ystep}"
            )));
        }

        if xstep == 0.0 {
            xstep = bbox.width() as f32;
        }
        if ystep == 0.0 {
            ystep = bbox.height() as f32;
        }

        let Some(r) = pattern.as_ref_value() else {
            self.doc.context().warn("tiling pattern is not a stream");
            return Ok(());
        };
        let content = self.doc.load_stream(r.num)?;

        let pattern_resources = dict.get(keys::RESOURCES).as_dict().unwrap_or_default();

        // The area needing tiles is decided by the device from its own
        // scissor; the pattern cell is the view.
        self.device.begin_tile(bbox, bbox, xstep, ystep, pattern_ctm);

        self.stack.push(GraphicsState::new(pattern_ctm));
        let saved_clips = self.open_clips;
        let result = self.execute(&content, &pattern_resources);
        while self.open_clips > saved_clips {
            self.device.pop_clip();
            self.open_clips -= 1;
        }
        self.stack.pop();

        self.device.end_tile();

        result
    }

    // -- XObjects --------------------------------------------------------

    fn x_object(&mut self, name: &Name, resources: &Dict) -> Result<()> {
        let value = self.lookup(resources, keys::X_OBJECT, name)?;

        let Some(r) = value.as_ref_value() else {
            self.doc.context().warn("XObject is not an indirect stream");
            return Ok(());
        };

        let Some(dict) = value.resolve().as_dict() else {
            self.doc.context().warn("XObject has no dictionary");
            return Ok(());
        };

        let subtype = dict.get(keys::SUBTYPE).as_name();

        if &*subtype == keys::IMAGE {
            if !self.visible() {
                return Ok(());
            }

            let data = self.doc.load_stream(r.num)?;
            let Some(image) = image::load_image(self.doc, &dict, &data) else {
                return Ok(());
            };

            let ctm = self.gs().ctm;

            if image.is_mask() {
                let color = self.gs().fill_color.clone().with_alpha(self.gs().fill_alpha);
                self.device.fill_image_mask(&image, ctm, &color);
            } else {
                self.device.fill_image(&image, ctm, self.gs().fill_alpha);
            }

            return Ok(());
        }

        if &*subtype == keys::FORM {
            if self.form_depth >= MAX_FORM_DEPTH {
                self.doc.context().warn("form XObjects nest too deeply");
                return Ok(());
            }

            let content = self.doc.load_stream(r.num)?;
            let form_resources = dict
                .get(keys::RESOURCES)
                .as_dict()
                .unwrap_or_else(|| resources.clone());

            let matrix = read_matrix(&dict).unwrap_or(Affine::IDENTITY);

            // Isolate the form in its own state, clipped to its BBox.
            let mut saved = self.gs().clone();
            saved.clip_base = self.open_clips;
            self.stack.push(saved);
            self.gs_mut().ctm *= matrix;

            let ctm = self.gs().ctm;

            if let Some(bbox) = read_rect(&dict, keys::BBOX) {
                self.device
                    .clip_path(&bbox.to_path(0.1), FillRule::NonZero, ctm);
                self.open_clips += 1;
            }

            let group = dict.get(keys::GROUP).as_dict();
            let transparency = group.as_ref().is_some_and(|g| {
                &*g.get(keys::S).as_name() == b"Transparency"
            });

            let alpha = self.gs().fill_alpha;

            if transparency {
                let group = group.unwrap();
                let isolated = group.get(keys::I).as_bool();
                let knockout = group.get(keys::K).as_bool();
                let area = read_rect(&dict, keys::BBOX)
                    .map(|b| ctm.transform_rect_bbox(b))
                    .unwrap_or(tarn_syntax::geom::INFINITE_RECT);
                let blend = self.gs().blend;

                self.device.begin_group(area, isolated, knockout, blend, alpha);
            }

            self.form_depth += 1;
            let result = self.execute(&content, &form_resources);
            self.form_depth -= 1;

            if transparency {
                self.device.end_group();
            }

            let popped = self.stack.pop().unwrap();
            while self.open_clips > popped.clip_base {
                self.device.pop_clip();
                self.open_clips -= 1;
            }

            return result;
        }

        self.doc.context().warn(&format!(
            "unsupported XObject subtype {}",
            subtype.as_str()
        ));
        Ok(())
    }

    fn inline_image(&mut self, dict: &Dict, data: &[u8]) {
        if !self.visible() {
            return;
        }

        if dict.contains_key(keys::F) || dict.contains_key(keys::FILTER) {
            self.doc
                .context()
                .warn("filtered inline images are not supported");
            return;
        }

        // Inline images use abbreviated keys; translate the ones we read.
        let full = Dict::new(8);
        for (key, value) in dict.entries() {
            let expanded: &[u8] = match &*key {
                b"W" => keys::WIDTH,
                b"H" => keys::HEIGHT,
                b"BPC" => keys::BITS_PER_COMPONENT,
                b"CS" => keys::COLORSPACE,
                b"IM" => keys::IMAGE_MASK,
                b"D" => keys::DECODE,
                b"I" => keys::INTERPOLATE,
                other => other,
            };
            full.put_key(expanded, value);
        }

        let Some(image) = image::load_image(self.doc, &full, data) else {
            return;
        };

        let ctm = self.gs().ctm;

        if image.is_mask() {
            let color = self.gs().fill_color.clone().with_alpha(self.gs().fill_alpha);
            self.device.fill_image_mask(&image, ctm, &color);
        } else {
            self.device.fill_image(&image, ctm, self.gs().fill_alpha);
        }
    }

    // -- Soft masks ------------------------------------------------------

    fn soft_mask(&mut self, mask: &Dict) -> Result<()> {
        let luminosity = &*mask.get(keys::S).as_name() == keys::LUMINOSITY;

        let Some(group_ref) = mask.get_raw(b"G").and_then(|v| v.as_ref_value()) else {
            self.doc.context().warn("soft mask lacks a group");
            return Ok(());
        };

        let Some(group_dict) = mask.get(b"G").as_dict() else {
            return Ok(());
        };

        let content = self.doc.load_stream(group_ref.num)?;
        let group_resources = group_dict.get(keys::RESOURCES).as_dict().unwrap_or_default();
        let matrix = read_matrix(&group_dict).unwrap_or(Affine::IDENTITY);

        let ctm = self.gs().ctm * matrix;
        let area = read_rect(&group_dict, keys::BBOX)
            .map(|b| ctm.transform_rect_bbox(b))
            .unwrap_or(tarn_syntax::geom::INFINITE_RECT);

        // The luminosity backdrop defaults to black.
        let backdrop = mask
            .get(b"BC")
            .as_array()
            .map(|a| a.to_floats())
            .map(|c| Color {
                space: ColorSpace::DeviceGray,
                components: c.into_iter().take(1).collect(),
                alpha: 1.0,
            })
            .unwrap_or_else(|| Color::gray(0.0));

        self.device.begin_mask(area, luminosity, &backdrop);

        self.stack.push(GraphicsState::new(ctm));
        let saved_clips = self.open_clips;
        let result = self.execute(&content, &group_resources);
        while self.open_clips > saved_clips {
            self.device.pop_clip();
            self.open_clips -= 1;
        }
        self.stack.pop();

        self.device.end_mask();
        // The finished mask clips everything until the state is restored.
        self.open_clips += 1;

        result
    }

    // -- Text ------------------------------------------------------------

    fn set_font(&mut self, name: &Name, resources: &Dict) -> Result<()> {
        let key = name.to_vec();

        if let Some(font) = self.fonts.get(&key) {
            self.gs_mut().text.font = Some(font.clone());
            return Ok(());
        }

        let dict = self
            .lookup(resources, keys::FONT, name)?
            .as_dict()
            .unwrap_or_default();

        let font = Arc::new(Font::load(self.doc, dict));
        self.fonts.insert(key, font.clone());
        self.gs_mut().text.font = Some(font);

        Ok(())
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix *= Affine::translate((tx, ty));
        self.text_matrix = self.line_matrix;
    }

    fn show_text(&mut self, bytes: &[u8]) -> Result<()> {
        let font = match &self.gs().text.font {
            Some(font) => font.clone(),
            None => {
                self.doc.context().warn("text shown before any font was set");
                Arc::new(Font::fallback())
            }
        };

        let size = self.gs().text.size;
        let h_scale = self.gs().text.h_scale;
        let rise = self.gs().text.rise;
        let char_space = self.gs().text.char_space;
        let word_space = self.gs().text.word_space;

        let mut glyphs = Vec::with_capacity(bytes.len() / font.code_len);

        for chunk in bytes.chunks(font.code_len) {
            let code = match font.code_len {
                2 if chunk.len() == 2 => u16::from_be_bytes([chunk[0], chunk[1]]) as u32,
                _ => chunk[0] as u32,
            };

            // Glyph space (1000 units/em) to user space at this glyph.
            let trm = self.text_matrix
                * Affine::new([
                    (size * h_scale) as f64,
                    0.0,
                    0.0,
                    size as f64,
                    0.0,
                    rise as f64,
                ]);

            glyphs.push(Glyph {
                id: code,
                code,
                unicode: char::from_u32(code).filter(|c| !c.is_control()),
                transform: trm,
            });

            let mut advance = font.advance(code) / 1000.0 * size + char_space;
            if code == 32 && font.code_len == 1 {
                advance += word_space;
            }

            self.text_matrix *= Affine::translate(((advance * h_scale) as f64, 0.0));

            if let Some(cookie) = self.cookie {
                if cookie.is_aborted() {
                    return Err(Error::Cancelled);
                }
            }
        }

        let span = TextSpan {
            font,
            size,
            glyphs,
        };

        if !self.visible() {
            return Ok(());
        }

        let ctm = self.gs().ctm;
        let mode = self.gs().text.render_mode;

        let fill_color = self.gs().fill_color.clone().with_alpha(self.gs().fill_alpha);
        let stroke_color = self
            .gs()
            .stroke_color
            .clone()
            .with_alpha(self.gs().stroke_alpha);
        let stroke_state = self.gs().stroke.clone();

        match mode {
            0 => self.device.fill_text(&span, ctm, &fill_color),
            1 => self.device.stroke_text(&span, &stroke_state, ctm, &stroke_color),
            2 => {
                self.device.fill_text(&span, ctm, &fill_color);
                self.device.stroke_text(&span, &stroke_state, ctm, &stroke_color);
            }
            3 => self.device.ignore_text(&span, ctm),
            4..=7 => {
                if mode != 7 {
                    if mode == 4 || mode == 6 {
                        self.device.fill_text(&span, ctm, &fill_color);
                    }
                    if mode == 5 || mode == 6 {
                        self.device.stroke_text(&span, &stroke_state, ctm, &stroke_color);
                    }
                }

                let accumulate = if self.text_clip_open {
                    ClipAccumulate::Continue
                } else {
                    self.text_clip_open = true;
                    self.open_clips += 1;
                    ClipAccumulate::Begin
                };
                self.device.clip_text(&span, ctm, accumulate);
            }
            other => {
                self.doc
                    .context()
                    .warn(&format!("unknown text rendering mode {other}"));
                self.device.fill_text(&span, ctm, &fill_color);
            }
        }

        Ok(())
    }

    // -- Optional content ------------------------------------------------

    fn begins_hidden_content(&self, args: &[Value], resources: &Dict) -> bool {
        let Some(tag) = args.first().map(|v| v.as_name()) else {
            return false;
        };

        if &*tag != b"OC" {
            return false;
        }

        let Some(Value::Name(prop_name)) = args.get(1) else {
            return false;
        };

        let properties = resources.get(b"Properties").as_dict().unwrap_or_default();

        match properties.get_raw(prop_name) {
            Some(Value::Ref(r)) => !self.doc.is_ocg_visible(r.num, r.gen),
            _ => false,
        }
    }
}

fn is_device_space(name: &Name) -> bool {
    matches!(
        &**name,
        b"DeviceGray" | b"DeviceRGB" | b"DeviceCMYK" | b"G" | b"RGB" | b"CMYK"
    )
}

fn read_matrix(dict: &Dict) -> Option<Affine> {
    let v = dict.get(keys::MATRIX).as_array()?.to_floats();

    if v.len() < 6 {
        return None;
    }

    Some(Affine::new([
        v[0] as f64,
        v[1] as f64,
        v[2] as f64,
        v[3] as f64,
        v[4] as f64,
        v[5] as f64,
    ]))
}

fn read_rect(dict: &Dict, key: &[u8]) -> Option<Rect> {
    let v = dict.get(key).as_array()?.to_floats();

    if v.len() < 4 {
        return None;
    }

    Some(normalize_rect(&Rect::new(
        v[0] as f64,
        v[1] as f64,
        v[2] as f64,
        v[3] as f64,
    )))
}
