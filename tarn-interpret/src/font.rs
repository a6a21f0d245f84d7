//! The font model, as far as the interpreter needs it.
//!
//! Glyph outlines and rasterization are external collaborators; here a
//! font is an identity plus the metrics needed to advance the text matrix.

use std::sync::atomic::{AtomicU64, Ordering};
use tarn_syntax::object::name::keys;
use tarn_syntax::object::{Dict, Value};
use tarn_syntax::Document;

static NEXT_FONT_ID: AtomicU64 = AtomicU64::new(1);

/// A loaded font resource.
#[derive(Debug)]
pub struct Font {
    /// Process-unique id, used as a glyph-cache key component.
    pub id: u64,
    /// The `BaseFont` name, for diagnostics and cache partitioning.
    pub name: String,
    /// The raw font dictionary, for collaborators that parse font files.
    pub dict: Dict,
    /// Bytes per character code: 1 for simple fonts, 2 for CID fonts.
    pub code_len: usize,
    first_char: i32,
    widths: Vec<f32>,
    default_width: f32,
}

impl Font {
    pub fn load(_doc: &Document, dict: Dict) -> Font {
        let subtype = dict.get(keys::SUBTYPE).as_name();
        let name = dict.get(b"BaseFont").as_name().as_str().into_owned();

        let code_len = if &*subtype == b"Type0" { 2 } else { 1 };

        if code_len == 2 {
            log::warn!("composite font {name}: widths default to 1000/1000");
        }

        let first_char = match dict.get(b"FirstChar") {
            Value::Int(i) => i,
            _ => 0,
        };

        let widths = dict
            .get(b"Widths")
            .as_array()
            .map(|a| a.to_floats())
            .unwrap_or_default();

        // A missing Widths table happens for the standard 14; a fixed
        // advance keeps layout roughly sane without font-file parsing.
        let default_width = if widths.is_empty() { 500.0 } else { 0.0 };

        Font {
            id: NEXT_FONT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            dict,
            code_len,
            first_char,
            widths,
            default_width,
        }
    }

    /// A placeholder for text shown before any `Tf`.
    pub fn fallback() -> Font {
        Font {
            id: 0,
            name: "(none)".into(),
            dict: Dict::new(0),
            code_len: 1,
            first_char: 0,
            widths: Vec::new(),
            default_width: 500.0,
        }
    }

    /// The advance of a character code in glyph space (1000 units per em).
    pub fn advance(&self, code: u32) -> f32 {
        let index = code as i64 - self.first_char as i64;

        if index >= 0 {
            if let Some(w) = self.widths.get(index as usize) {
                return *w;
            }
        }

        if self.code_len == 2 {
            1000.0
        } else {
            self.default_width
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_syntax::object::Array;

    #[test]
    fn widths_are_indexed_from_first_char() {
        let dict = Dict::new(3);
        dict.put_key(b"FirstChar", Value::Int(65));
        dict.put_key(
            b"Widths",
            Value::Array(Array::from_vec(vec![
                Value::Int(600),
                Value::Int(700),
            ])),
        );

        let font = Font {
            id: 1,
            name: "Test".into(),
            dict: dict.clone(),
            code_len: 1,
            first_char: 65,
            widths: vec![600.0, 700.0],
            default_width: 0.0,
        };

        assert_eq!(font.advance(65), 600.0);
        assert_eq!(font.advance(66), 700.0);
        assert_eq!(font.advance(64), 0.0);
    }
}
