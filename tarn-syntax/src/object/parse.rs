//! Parsing values from raw bytes.

use crate::document::DocLink;
use crate::object::{Array, Dict, Name, ObjRef, PdfString, Value};
use crate::reader::{is_regular, is_white_space, Reader};

/// Context threaded through value parsing.
#[derive(Clone)]
pub(crate) struct ParseCtx {
    /// Link embedded into parsed references.
    pub doc: DocLink,
    /// Whether `N G R` references may occur. False inside content streams,
    /// which never contain them; this removes the number lookahead.
    pub allow_refs: bool,
}

impl ParseCtx {
    pub fn new(doc: DocLink) -> Self {
        Self {
            doc,
            allow_refs: true,
        }
    }

    /// A context with no document behind it (for tests and scratch parsing).
    pub fn detached() -> Self {
        Self {
            doc: DocLink::new(),
            allow_refs: true,
        }
    }
}

/// Parse one value. The reader is left after the value on success and at
/// its original position on failure.
pub(crate) fn parse_value(r: &mut Reader<'_>, ctx: &ParseCtx) -> Option<Value> {
    let start = r.offset();

    let parsed = parse_value_impl(r, ctx);

    if parsed.is_none() {
        r.jump(start);
    }

    parsed
}

fn parse_value_impl(r: &mut Reader<'_>, ctx: &ParseCtx) -> Option<Value> {
    r.skip_white_spaces_and_comments();

    match r.peek_byte()? {
        b'/' => parse_name(r).map(Value::Name),
        b'(' => parse_literal_string(r).map(|s| Value::String(PdfString::new(s))),
        b'<' => {
            if r.peek_tag(b"<<") {
                parse_dict(r, ctx).map(Value::Dict)
            } else {
                parse_hex_string(r).map(|s| Value::String(PdfString::new(s)))
            }
        }
        b'[' => parse_array(r, ctx).map(Value::Array),
        b'.' | b'+' | b'-' | b'0'..=b'9' => parse_number_or_ref(r, ctx),
        b't' => r.forward_tag(b"true").map(|_| Value::Bool(true)),
        b'f' => r.forward_tag(b"false").map(|_| Value::Bool(false)),
        b'n' => r.forward_tag(b"null").map(|_| Value::Null),
        _ => None,
    }
}

/// Parse the `N G obj` header of an indirect object.
pub(crate) fn parse_indirect_header(r: &mut Reader<'_>) -> Option<(i32, i32)> {
    let start = r.offset();

    let parsed = (|| {
        let num = r.read_uint()?;
        r.skip_white_spaces_and_comments();
        let gen = r.read_uint()?;
        r.skip_white_spaces_and_comments();
        r.forward_tag(b"obj")?;

        Some((i32::try_from(num).ok()?, i32::try_from(gen).ok()?))
    })();

    if parsed.is_none() {
        r.jump(start);
    }

    parsed
}

fn parse_number_or_ref(r: &mut Reader<'_>, ctx: &ParseCtx) -> Option<Value> {
    // A number can unambiguously be told apart from the start of an object
    // reference only by looking ahead for the `G R` part.
    if ctx.allow_refs && matches!(r.peek_byte(), Some(b'0'..=b'9')) {
        let mut probe = r.clone();

        let attempt = (|| {
            let num = probe.read_uint()?;
            probe.forward_if(is_white_space)?;
            probe.skip_white_spaces_and_comments();
            let gen = probe.read_uint()?;
            probe.forward_if(is_white_space)?;
            probe.skip_white_spaces_and_comments();
            probe.forward_tag(b"R")?;

            // Make sure `R` is a complete token (not e.g. `Rotate`).
            if probe.peek_byte().is_some_and(is_regular) {
                return None;
            }

            Some((i32::try_from(num).ok()?, i32::try_from(gen).ok()?))
        })();

        if let Some((num, gen)) = attempt {
            r.jump(probe.offset());
            return Some(Value::Ref(ObjRef::new(num, gen, ctx.doc.clone())));
        }
    }

    parse_number(r)
}

/// Parse an integer or real number.
pub(crate) fn parse_number(r: &mut Reader<'_>) -> Option<Value> {
    let token_start = r.offset();

    let negative = match r.peek_byte()? {
        b'-' => {
            r.forward();
            true
        }
        b'+' => {
            r.forward();
            false
        }
        _ => false,
    };

    let mut int_part: i64 = 0;
    let mut any_digits = false;

    while let Some(b @ b'0'..=b'9') = r.peek_byte() {
        int_part = int_part.saturating_mul(10).saturating_add((b - b'0') as i64);
        r.forward();
        any_digits = true;
    }

    let mut is_real = false;
    let mut frac = 0.0f64;
    let mut scale = 0.1f64;

    if r.peek_byte() == Some(b'.') {
        is_real = true;
        r.forward();

        while let Some(b @ b'0'..=b'9') = r.peek_byte() {
            frac += (b - b'0') as f64 * scale;
            scale *= 0.1;
            r.forward();
            any_digits = true;
        }
    }

    if !any_digits {
        r.jump(token_start);
        return None;
    }

    if is_real {
        let value = (int_part as f64 + frac) * if negative { -1.0 } else { 1.0 };
        Some(Value::Real(value as f32))
    } else {
        let value = if negative { -int_part } else { int_part };
        Some(Value::Int(value.clamp(i32::MIN as i64, i32::MAX as i64) as i32))
    }
}

/// Parse a `/Name`, unescaping `#xx` pairs.
pub(crate) fn parse_name(r: &mut Reader<'_>) -> Option<Name> {
    r.forward_tag(b"/")?;

    let mut bytes = Vec::new();

    while let Some(b) = r.peek_byte() {
        if !is_regular(b) {
            break;
        }
        r.forward();

        if b == b'#' {
            let hex = r.peek_bytes(2).and_then(|h| {
                let hi = hex_digit(h[0])?;
                let lo = hex_digit(h[1])?;
                Some(hi * 16 + lo)
            });

            match hex {
                Some(v) => {
                    r.skip_bytes(2);
                    bytes.push(v);
                }
                // A bare `#` in a name is broken but common enough.
                None => bytes.push(b'#'),
            }
        } else {
            bytes.push(b);
        }
    }

    Some(Name::new(&bytes))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn parse_literal_string(r: &mut Reader<'_>) -> Option<Vec<u8>> {
    r.forward_tag(b"(")?;

    let mut out = Vec::new();
    let mut depth = 1u32;

    loop {
        let b = r.read_byte()?;

        match b {
            b'(' => {
                depth += 1;
                out.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
                out.push(b);
            }
            b'\\' => {
                let esc = r.read_byte()?;
                match esc {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'(' | b')' | b'\\' => out.push(esc),
                    b'\r' => {
                        // Line continuation; swallow an optional LF.
                        r.forward_if(|b| b == b'\n');
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut v = (esc - b'0') as u32;
                        for _ in 0..2 {
                            match r.peek_byte() {
                                Some(d @ b'0'..=b'7') => {
                                    v = v * 8 + (d - b'0') as u32;
                                    r.forward();
                                }
                                _ => break,
                            }
                        }
                        out.push(v as u8);
                    }
                    // An unknown escape drops the backslash.
                    other => out.push(other),
                }
            }
            _ => out.push(b),
        }
    }
}

fn parse_hex_string(r: &mut Reader<'_>) -> Option<Vec<u8>> {
    r.forward_tag(b"<")?;

    let mut out = Vec::new();
    let mut pending: Option<u8> = None;

    loop {
        let b = r.read_byte()?;

        if b == b'>' {
            // An odd final digit is padded with zero.
            if let Some(hi) = pending {
                out.push(hi * 16);
            }
            return Some(out);
        }

        if is_white_space(b) {
            continue;
        }

        let digit = hex_digit(b)?;

        match pending.take() {
            Some(hi) => out.push(hi * 16 + digit),
            None => pending = Some(digit),
        }
    }
}

fn parse_array(r: &mut Reader<'_>, ctx: &ParseCtx) -> Option<Array> {
    r.forward_tag(b"[")?;

    let array = Array::new(8);

    loop {
        r.skip_white_spaces_and_comments();

        if r.forward_tag(b"]").is_some() {
            return Some(array);
        }

        let value = parse_value(r, ctx)?;
        array.push(value);
    }
}

pub(crate) fn parse_dict(r: &mut Reader<'_>, ctx: &ParseCtx) -> Option<Dict> {
    r.forward_tag(b"<<")?;

    let dict = Dict::new(8);

    loop {
        r.skip_white_spaces_and_comments();

        if r.forward_tag(b">>").is_some() {
            return Some(dict);
        }

        let Some(name) = parse_name(r) else {
            // Garbage between entries: skip one value leniently.
            parse_value(r, ctx)?;
            continue;
        };

        r.skip_white_spaces_and_comments();
        let value = parse_value(r, ctx)?;
        dict.put(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Option<Value> {
        let mut r = Reader::new(data);
        parse_value(&mut r, &ParseCtx::detached())
    }

    #[test]
    fn primitives() {
        assert!(matches!(parse(b"null").unwrap(), Value::Null));
        assert!(matches!(parse(b"true").unwrap(), Value::Bool(true)));
        assert_eq!(parse(b"34").unwrap().as_int(), 34);
        assert_eq!(parse(b"-3.25").unwrap().as_real(), -3.25);
        assert_eq!(parse(b".5").unwrap().as_real(), 0.5);
    }

    #[test]
    fn strings() {
        assert_eq!(&*parse(b"(hello)").unwrap().as_string(), b"hello");
        assert_eq!(&*parse(b"(a\\(b\\))").unwrap().as_string(), b"a(b)");
        assert_eq!(&*parse(b"(nested (parens))").unwrap().as_string(), b"nested (parens)");
        assert_eq!(&*parse(b"(\\101\\12)").unwrap().as_string(), b"A\n");
        assert_eq!(&*parse(b"<48656C6C6F>").unwrap().as_string(), b"Hello");
        assert_eq!(&*parse(b"<48 65 6>").unwrap().as_string(), b"He`");
    }

    #[test]
    fn names() {
        let n = parse(b"/Type").unwrap().as_name();
        assert_eq!(&*n, b"Type");

        let n = parse(b"/PANTONE#20104#20C").unwrap().as_name();
        assert_eq!(&*n, b"PANTONE 104 C");
    }

    #[test]
    fn arrays_and_dicts() {
        let a = parse(b"[1 2.5 /X (s)]").unwrap().as_array().unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a.get(1).as_real(), 2.5);

        let d = parse(b"<< /A 1 /B << /C true >> >>").unwrap().as_dict().unwrap();
        assert_eq!(d.get(b"A").as_int(), 1);
        assert!(d.get(b"B").as_dict().unwrap().get(b"C").as_bool());
    }

    #[test]
    fn references_need_full_pattern() {
        let v = parse(b"12 0 R").unwrap();
        let r = v.as_ref_value().unwrap();
        assert_eq!((r.num, r.gen), (12, 0));

        // `R` must be a complete token.
        let v = parse(b"12 0 Rot").unwrap();
        assert_eq!(v.as_int(), 12);

        // Two numbers without the keyword are just a number.
        let v = parse(b"12 0").unwrap();
        assert_eq!(v.as_int(), 12);
    }

    #[test]
    fn dict_with_garbage_entry() {
        let d = parse(b"<< /A 1 2000 /B 2 >>").unwrap().as_dict().unwrap();
        assert_eq!(d.get(b"A").as_int(), 1);
        assert_eq!(d.get(b"B").as_int(), 2);
    }

    #[test]
    fn indirect_header() {
        let mut r = Reader::new(b"7 0 obj << >> endobj");
        assert_eq!(parse_indirect_header(&mut r), Some((7, 0)));
    }
}
