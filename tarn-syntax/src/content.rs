//! Tokenizing content streams.
//!
//! Content streams are a sequence of operands followed by an operator.
//! Operands are ordinary values, with one simplification: object references
//! cannot occur, so numbers never need a look-ahead.

use crate::object::parse::{parse_dict, parse_value, ParseCtx};
use crate::object::{Dict, Value};
use crate::reader::{is_regular, is_white_space, Reader};

/// One item of a content stream.
pub enum ContentItem<'a> {
    Operand(Value),
    Operator(&'a [u8]),
}

/// A pull lexer over content-stream bytes.
pub struct ContentLexer<'a> {
    r: Reader<'a>,
    ctx: ParseCtx,
}

impl<'a> ContentLexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut ctx = ParseCtx::detached();
        ctx.allow_refs = false;

        Self {
            r: Reader::new(data),
            ctx,
        }
    }

    pub fn at_end(&self) -> bool {
        self.r.at_end()
    }

    /// The next operand or operator; `None` at the end of the stream.
    /// Unparsable bytes are skipped.
    pub fn next_item(&mut self) -> Option<ContentItem<'a>> {
        loop {
            self.r.skip_white_spaces_and_comments();

            if self.r.at_end() {
                return None;
            }

            if let Some(value) = parse_value(&mut self.r, &self.ctx) {
                return Some(ContentItem::Operand(value));
            }

            if let Some(token) = self.r.read_token() {
                return Some(ContentItem::Operator(token));
            }

            // A stray delimiter no value syntax claims.
            self.r.forward();
        }
    }

    /// Consume an inline image after its `BI` operator: the parameter
    /// dictionary up to `ID`, then the binary data up to `EI`.
    pub fn read_inline_image(&mut self) -> Option<(Dict, &'a [u8])> {
        let dict = Dict::new(8);

        loop {
            self.r.skip_white_spaces_and_comments();

            if self.r.forward_tag(b"ID").is_some() {
                break;
            }

            let Value::Name(key) = parse_value(&mut self.r, &self.ctx)? else {
                return None;
            };
            self.r.skip_white_spaces_and_comments();
            let value = parse_value(&mut self.r, &self.ctx)?;
            dict.put(key, value);
        }

        // A single white-space separates ID from the data.
        self.r.forward_if(is_white_space);

        let start = self.r.offset();

        // The terminator is `EI` as a complete token.
        loop {
            let pos = self.r.offset();

            if self.r.at_end() {
                return None;
            }

            if self.r.forward_tag(b"EI").is_some()
                && !self.r.peek_byte().is_some_and(is_regular)
            {
                let data = self.r.range(start..pos)?;
                // Trailing white-space before EI belongs to the syntax.
                let data = trim_trailing_ws(data);
                return Some((dict, data));
            }

            self.r.jump(pos);
            self.r.forward();
        }
    }
}

fn trim_trailing_ws(mut data: &[u8]) -> &[u8] {
    while let Some((last, rest)) = data.split_last() {
        if is_white_space(*last) {
            data = rest;
        } else {
            break;
        }
    }
    data
}

/// Parse a standalone dictionary (used for `BDC` property lists).
pub fn parse_standalone_dict(data: &[u8]) -> Option<Dict> {
    let mut ctx = ParseCtx::detached();
    ctx.allow_refs = false;

    parse_dict(&mut Reader::new(data), &ctx)
}
