//! Serializing values back to PDF syntax.

use crate::object::{Name, PdfString, Value};
use crate::reader::is_regular;

/// Serialize a value in tight form (minimal separators).
pub fn format_tight(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, false, 0);
    out
}

/// Serialize a value with indentation for human consumption.
pub fn format_pretty(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, true, 0);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value, pretty: bool, depth: usize) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        Value::String(s) => write_string(out, s),
        Value::Name(n) => write_name(out, n),
        Value::Ref(r) => out.extend_from_slice(format!("{} {} R", r.num, r.gen).as_bytes()),
        Value::Array(a) => {
            out.push(b'[');

            for (i, item) in a.snapshot().iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(out, item, pretty, depth + 1);
            }

            out.push(b']');
        }
        Value::Dict(d) => {
            if !d.mark() {
                // Cycle: print a placeholder rather than recursing forever.
                out.extend_from_slice(b"<<>>");
                return;
            }

            out.extend_from_slice(b"<<");

            for (name, item) in d.entries() {
                if pretty {
                    out.push(b'\n');
                    out.extend(std::iter::repeat(b' ').take((depth + 1) * 2));
                } else {
                    out.push(b' ');
                }

                write_name(out, &name);
                out.push(b' ');
                write_value(out, &item, pretty, depth + 1);
            }

            if pretty {
                out.push(b'\n');
                out.extend(std::iter::repeat(b' ').take(depth * 2));
            } else {
                out.push(b' ');
            }

            out.extend_from_slice(b">>");
            d.unmark();
        }
    }
}

fn format_real(r: f32) -> String {
    if !r.is_finite() {
        return "0".to_string();
    }

    let s = format!("{r}");

    if s.contains('e') || s.contains('E') {
        // The grammar has no exponent form.
        return format!("{r:.9}");
    }

    // A real must not read back as an integer token.
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

fn write_name(out: &mut Vec<u8>, name: &Name) {
    out.push(b'/');

    for &b in name.iter() {
        if is_regular(b) && b != b'#' && b.is_ascii_graphic() {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &PdfString) {
    // Escape-or-hex, chosen by the proportion of non-printable bytes.
    let binary = s.iter().filter(|b| !is_printable(**b)).count();

    if binary * 4 > s.len() {
        out.push(b'<');
        for b in s.iter() {
            out.extend_from_slice(format!("{b:02X}").as_bytes());
        }
        out.push(b'>');
    } else {
        out.push(b'(');
        for &b in s.iter() {
            match b {
                b'(' | b')' | b'\\' => {
                    out.push(b'\\');
                    out.push(b);
                }
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                _ if is_printable(b) => out.push(b),
                _ => out.extend_from_slice(format!("\\{:03o}", b).as_bytes()),
            }
        }
        out.push(b')');
    }
}

fn is_printable(b: u8) -> bool {
    (0x20..0x7f).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::parse::{parse_value, ParseCtx};
    use crate::object::{Array, Dict};
    use crate::reader::Reader;

    fn roundtrip(value: &Value) {
        for printed in [format_tight(value), format_pretty(value)] {
            let mut r = Reader::new(&printed);
            let reparsed = parse_value(&mut r, &ParseCtx::detached())
                .unwrap_or_else(|| panic!("unparsable output: {:?}", String::from_utf8_lossy(&printed)));

            assert!(
                value.deep_eq(&reparsed),
                "roundtrip mismatch: {:?} -> {:?}",
                value,
                String::from_utf8_lossy(&printed)
            );
        }
    }

    #[test]
    fn roundtrip_primitives() {
        roundtrip(&Value::Null);
        roundtrip(&Value::Bool(true));
        roundtrip(&Value::Int(-17));
        roundtrip(&Value::Real(2.5));
        roundtrip(&Value::Real(3.0));
        roundtrip(&Value::Name(Name::new(b"Weird Name#x")));
    }

    #[test]
    fn roundtrip_strings() {
        roundtrip(&Value::String(PdfString::new(b"plain text".to_vec())));
        roundtrip(&Value::String(PdfString::new(b"with (parens) \\ and \n".to_vec())));
        roundtrip(&Value::String(PdfString::new(vec![0, 1, 2, 0xff, 0xfe])));
        roundtrip(&Value::String(PdfString::new(b"NUL \x00 inside".to_vec())));
    }

    #[test]
    fn roundtrip_containers() {
        let inner = Dict::new(2);
        inner.put_key(b"A", Value::Int(1));
        inner.put_key(b"B", Value::Real(0.5));

        let array = Array::from_vec(vec![
            Value::Bool(false),
            Value::Dict(inner),
            Value::String(PdfString::new(b"s".to_vec())),
        ]);

        let outer = Dict::new(2);
        outer.put_key(b"Kids", Value::Array(array));
        outer.put_key(b"Type", Value::Name(Name::new(b"Pages")));

        roundtrip(&Value::Dict(outer));
    }

    #[test]
    fn binary_heavy_strings_use_hex() {
        let printed = format_tight(&Value::String(PdfString::new(vec![0xde, 0xad, 0xbe, 0xef])));
        assert_eq!(printed, b"<DEADBEEF>");
    }
}
