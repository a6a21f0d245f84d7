//! Reading, validating and repairing the cross-reference table.

use crate::context::Context;
use crate::error::Result;
use crate::filter::{decode_with_chain, FilterRegistry};
use crate::object::name::keys;
use crate::object::parse::{parse_dict, parse_indirect_header, parse_value, ParseCtx};
use crate::object::{Dict, Value};
use crate::raise;
use crate::reader::Reader;
use rustc_hash::FxHashSet;

/// How far back from the end of the file `startxref` is searched.
const START_XREF_WINDOW: usize = 1024;

/// What an xref entry points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// Not written by any section yet.
    Unset,
    /// A free slot.
    Free,
    /// An object stored at a byte offset in the file.
    InUse { offset: usize },
    /// An object packed into an object stream.
    InStream { container: i32, index: i32 },
}

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub kind: EntryKind,
    pub gen: i32,
    /// Offset of the stream body, captured when the object is parsed.
    pub stream_offset: Option<usize>,
    pub cached: Option<Value>,
}

impl Entry {
    fn unset() -> Self {
        Self {
            kind: EntryKind::Unset,
            gen: 0,
            stream_offset: None,
            cached: None,
        }
    }
}

/// The object index: one entry per object number.
#[derive(Debug, Default)]
pub(crate) struct XrefTable {
    entries: Vec<Entry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn resize(&mut self, len: usize) {
        if len > self.entries.len() {
            self.entries.resize_with(len, Entry::unset);
        }
    }

    pub fn entry(&self, num: i32) -> Option<&Entry> {
        usize::try_from(num).ok().and_then(|i| self.entries.get(i))
    }

    pub fn entry_mut(&mut self, num: i32) -> Option<&mut Entry> {
        usize::try_from(num)
            .ok()
            .and_then(|i| self.entries.get_mut(i))
    }

    /// Write an entry only if no earlier section claimed the slot. Sections
    /// are read newest-first, so the first occurrence wins.
    fn set_if_unset(&mut self, num: i32, kind: EntryKind, gen: i32) {
        let Ok(index) = usize::try_from(num) else {
            return;
        };

        self.resize(index + 1);

        if self.entries[index].kind == EntryKind::Unset {
            self.entries[index].kind = kind;
            self.entries[index].gen = gen;
        }
    }

    /// Write an entry unconditionally (repair scans run oldest-first, so
    /// the latest occurrence wins there).
    fn set(&mut self, num: i32, kind: EntryKind, gen: i32) {
        let Ok(index) = usize::try_from(num) else {
            return;
        };

        self.resize(index + 1);
        self.entries[index].kind = kind;
        self.entries[index].gen = gen;
    }
}

/// Everything xref loading needs besides the table itself.
pub(crate) struct LoadCtx<'a> {
    pub data: &'a [u8],
    pub parse: ParseCtx,
    pub registry: &'a FilterRegistry,
    pub ctx: &'a Context,
}

/// Scan the tail of the file for `startxref` and the offset after it.
pub(crate) fn find_start_xref(data: &[u8]) -> Result<usize> {
    let window_start = data.len().saturating_sub(START_XREF_WINDOW);
    let window = &data[window_start..];

    let needle = b"startxref";

    for i in (0..window.len().saturating_sub(needle.len())).rev() {
        if &window[i..i + needle.len()] == needle {
            let mut r = Reader::new_at(window, i + needle.len());
            r.skip_white_spaces_and_comments();

            if let Some(offset) = r.read_uint() {
                return Ok(offset as usize);
            }
        }
    }

    raise!("cannot find startxref");
}

/// Load the complete xref chain and return the document trailer.
pub(crate) fn load_xref(load: &LoadCtx<'_>, table: &mut XrefTable) -> Result<Dict> {
    let start = find_start_xref(load.data)?;

    let mut visited = FxHashSet::default();
    let trailer = read_sections(load, start, table, &mut visited)?;

    let size = trailer.get(keys::SIZE).as_int();
    if size > 0 {
        table.resize(size as usize);
    }

    validate(load.data.len(), table)?;

    Ok(trailer)
}

fn read_sections(
    load: &LoadCtx<'_>,
    offset: usize,
    table: &mut XrefTable,
    visited: &mut FxHashSet<usize>,
) -> Result<Dict> {
    if !visited.insert(offset) {
        raise!("circular xref section chain at offset {offset}");
    }

    let trailer = read_section(load, offset, table)?;

    // In hybrid files the XRefStm entries shadow the classic section's
    // predecessors, so it is chased before Prev.
    let xref_stm = trailer.get(keys::XREF_STM);
    if let Value::Int(stm_offset) = xref_stm {
        read_sections(load, stm_offset.max(0) as usize, table, visited)?;
    }

    let prev = trailer.get(keys::PREV);
    if let Value::Int(prev_offset) = prev {
        read_sections(load, prev_offset.max(0) as usize, table, visited)?;
    }

    Ok(trailer)
}

fn read_section(load: &LoadCtx<'_>, offset: usize, table: &mut XrefTable) -> Result<Dict> {
    if offset >= load.data.len() {
        raise!("xref offset {offset} is past the end of the file");
    }

    let mut r = Reader::new_at(load.data, offset);
    r.skip_white_spaces_and_comments();

    match r.peek_byte() {
        Some(b'x') => read_classic_section(load, &mut r, table),
        Some(b'0'..=b'9') => read_stream_section(load, &mut r, table),
        Some(other) => raise!("cannot recognize xref format starting with {:?}", other as char),
        None => raise!("truncated xref section at offset {offset}"),
    }
}

/// The classic tabular form: `xref`, subsections of 20-byte entries, then
/// `trailer` and a dictionary.
fn read_classic_section(
    load: &LoadCtx<'_>,
    r: &mut Reader<'_>,
    table: &mut XrefTable,
) -> Result<Dict> {
    if r.forward_tag(b"xref").is_none() {
        raise!("cannot find xref marker");
    }

    loop {
        r.skip_white_spaces_and_comments();

        if !matches!(r.peek_byte(), Some(b'0'..=b'9')) {
            break;
        }

        let Some(first) = r.read_uint() else {
            raise!("invalid subsection header");
        };
        r.skip_white_spaces();
        let Some(count) = r.read_uint() else {
            raise!("invalid subsection header");
        };

        for i in 0..count {
            // The fixed 20-byte form, parsed leniently: broken producers
            // emit 19-byte rows, shared lines and stray leading spaces.
            r.skip_white_spaces();
            let Some(offset) = r.read_uint() else {
                raise!("truncated xref subsection");
            };
            r.skip_white_spaces();
            let Some(gen) = r.read_uint() else {
                raise!("truncated xref subsection");
            };
            r.skip_white_spaces();

            let num = (first + i) as i32;
            let gen = gen as i32;

            match r.read_byte() {
                Some(b'n') => table.set_if_unset(num, EntryKind::InUse { offset: offset as usize }, gen),
                Some(b'f') => table.set_if_unset(num, EntryKind::Free, gen),
                Some(b'o') => table.set_if_unset(
                    num,
                    EntryKind::InStream {
                        container: offset as i32,
                        index: gen,
                    },
                    0,
                ),
                other => raise!("unexpected xref entry type {other:?} ({num} {gen} R)"),
            }
        }
    }

    r.skip_white_spaces_and_comments();
    if r.forward_tag(b"trailer").is_none() {
        raise!("expected trailer marker");
    }

    r.skip_white_spaces_and_comments();
    match parse_dict(r, &load.parse) {
        Some(dict) => Ok(dict),
        None => raise!("cannot parse trailer dictionary"),
    }
}

/// The stream form: an indirect stream object whose packed body is the
/// table.
fn read_stream_section(
    load: &LoadCtx<'_>,
    r: &mut Reader<'_>,
    table: &mut XrefTable,
) -> Result<Dict> {
    let Some((num, gen)) = parse_indirect_header(r) else {
        raise!("cannot parse xref stream object header");
    };

    r.skip_white_spaces_and_comments();
    let Some(dict) = parse_dict(r, &load.parse) else {
        raise!("cannot parse xref stream dictionary ({num} {gen} R)");
    };

    r.skip_white_spaces_and_comments();
    if r.forward_tag(b"stream").is_none() {
        raise!("xref object is not a stream ({num} {gen} R)");
    }
    r.forward_if(|b| b == b'\r');
    r.forward_if(|b| b == b'\n');

    let raw = stream_extent(load.data, r.offset(), &dict)?;
    let decoded = decode_with_chain(raw, &dict, load.registry, load.ctx)?;

    let size = dict.get(keys::SIZE).as_int();
    if size <= 0 {
        raise!("xref stream missing Size entry ({num} {gen} R)");
    }

    let Some(w) = dict.get(keys::W).as_array() else {
        raise!("xref stream missing W entry ({num} {gen} R)");
    };
    let widths = w.to_ints();
    let (w0, w1, w2) = (
        widths.first().copied().unwrap_or(0),
        widths.get(1).copied().unwrap_or(0),
        widths.get(2).copied().unwrap_or(0),
    );

    if !(0..=4).contains(&w0) || !(0..=8).contains(&w1) || !(0..=8).contains(&w2) {
        raise!("xref stream has invalid field widths {w0} {w1} {w2}");
    }

    let mut ranges = Vec::new();
    match dict.get(keys::INDEX).as_array() {
        Some(index) => {
            let ints = index.to_ints();
            for pair in ints.chunks_exact(2) {
                ranges.push((pair[0], pair[1]));
            }
        }
        None => ranges.push((0, size)),
    }

    let mut cursor = 0usize;
    let record_len = (w0 + w1 + w2) as usize;

    for (first, count) in ranges {
        for i in 0..count.max(0) {
            let Some(record) = decoded.get(cursor..cursor + record_len) else {
                raise!("truncated xref stream ({num} {gen} R)");
            };
            cursor += record_len;

            let mut pos = 0usize;
            let mut field = |width: i32| -> u64 {
                let mut v: u64 = 0;
                for _ in 0..width {
                    v = (v << 8) | record[pos] as u64;
                    pos += 1;
                }
                v
            };

            // A zero-width type field defaults to 1 (in use); the other
            // fields default to 0.
            let kind = if w0 == 0 { 1 } else { field(w0) };
            let b = field(w1);
            let c = field(w2);

            let obj = first + i;

            match kind {
                0 => table.set_if_unset(obj, EntryKind::Free, c as i32),
                1 => table.set_if_unset(obj, EntryKind::InUse { offset: b as usize }, c as i32),
                2 => table.set_if_unset(
                    obj,
                    EntryKind::InStream {
                        container: b as i32,
                        index: c as i32,
                    },
                    0,
                ),
                other => raise!("xref stream has unknown entry type {other}"),
            }
        }
    }

    Ok(dict)
}

/// The raw extent of a stream body starting at `body_start`.
///
/// A direct Length that is confirmed by a following `endstream` wins;
/// anything else falls back to scanning for the keyword.
pub(crate) fn stream_extent<'a>(
    data: &'a [u8],
    body_start: usize,
    dict: &Dict,
) -> Result<&'a [u8]> {
    if let Some(Value::Int(len)) = dict.get_raw(keys::LENGTH) {
        if len >= 0 {
            let end = body_start + len as usize;

            if let Some(body) = data.get(body_start..end) {
                let mut r = Reader::new_at(data, end);
                r.skip_white_spaces();
                if r.peek_tag(b"endstream") {
                    return Ok(body);
                }
            }
        }
    }

    // Length missing, indirect or wrong: find the terminator ourselves.
    let tail = match data.get(body_start..) {
        Some(t) => t,
        None => raise!("stream body starts past the end of the file"),
    };

    let needle = b"endstream";
    let found = tail
        .windows(needle.len())
        .position(|window| window == needle);

    match found {
        Some(mut end) => {
            // Trailing EOL before the keyword belongs to the syntax, not
            // the data.
            while end > 0 && matches!(tail[end - 1], b'\r' | b'\n') {
                end -= 1;
            }
            Ok(&tail[..end])
        }
        None => raise!("unterminated stream"),
    }
}

/// Post-load sanity pass over the whole table.
fn validate(file_size: usize, table: &mut XrefTable) -> Result<()> {
    if table.len() == 0 {
        raise!("empty xref table");
    }

    match table.entry(0).map(|e| &e.kind) {
        Some(EntryKind::Free) => {}
        _ => raise!("first object in xref is not free"),
    }

    for num in 0..table.len() as i32 {
        let entry = table.entry_mut(num).unwrap();

        match entry.kind.clone() {
            // "0000000000 ????? n" means free according to some producers.
            EntryKind::InUse { offset: 0 } => entry.kind = EntryKind::Free,
            EntryKind::InUse { offset } => {
                if offset >= file_size {
                    raise!("object offset out of range: {offset} ({num} 0 R)");
                }
            }
            EntryKind::Unset => entry.kind = EntryKind::Free,
            _ => {}
        }
    }

    for num in 0..table.len() as i32 {
        if let Some(Entry {
            kind: EntryKind::InStream { container, .. },
            ..
        }) = table.entry(num)
        {
            let container_ok = matches!(
                table.entry(*container).map(|e| &e.kind),
                Some(EntryKind::InUse { .. })
            );

            if !container_ok {
                raise!("invalid reference to an objstm that does not exist: {container} ({num} 0 R)");
            }
        }
    }

    Ok(())
}

/// Rebuild the table by scanning the file for `N G obj` boundaries.
///
/// Returns the synthesized table and the best trailer dictionary that could
/// be recovered (possibly with a reconstructed `Root`).
pub(crate) fn repair_xref(load: &LoadCtx<'_>) -> Result<(XrefTable, Dict)> {
    log::warn!("trying to repair broken xref");

    let mut table = XrefTable::new();
    let mut trailer_dicts: Vec<Dict> = Vec::new();
    let mut catalog: Option<(i32, i32)> = None;
    let mut info: Option<(i32, i32)> = None;

    let mut r = Reader::new(load.data);

    loop {
        r.skip_white_spaces_and_comments();

        if r.at_end() {
            break;
        }

        let pos = r.offset();

        if let Some((num, gen)) = parse_indirect_header(&mut r) {
            r.skip_white_spaces_and_comments();

            let Some(value) = parse_value(&mut r, &load.parse) else {
                // The header was a false positive; resume after it.
                continue;
            };

            // Repair scans run front to back, so later definitions of the
            // same object (incremental updates) overwrite earlier ones.
            table.set(num, EntryKind::InUse { offset: pos }, gen);

            if let Some(dict) = value.as_dict() {
                let tag = dict.get_raw(keys::TYPE).map(|t| t.as_name());

                if tag.as_ref().is_some_and(|t| &**t == keys::CATALOG) {
                    catalog = Some((num, gen));
                }

                if dict.contains_key(keys::CREATOR) || dict.contains_key(keys::PRODUCER) {
                    info.get_or_insert((num, gen));
                }

                // Skip stream bodies so binary content cannot fake object
                // boundaries; expand object streams as they pass by.
                r.skip_white_spaces_and_comments();
                if r.forward_tag(b"stream").is_some() {
                    r.forward_if(|b| b == b'\r');
                    r.forward_if(|b| b == b'\n');

                    let body_start = r.offset();
                    if let Ok(raw) = stream_extent(load.data, body_start, &dict) {
                        r.jump(body_start + raw.len());
                        r.skip_white_spaces();
                        let _ = r.forward_tag(b"endstream");

                        if tag.as_ref().is_some_and(|t| &**t == b"ObjStm") {
                            expand_object_stream(load, &dict, raw, num, &mut table);
                        }
                    }
                }
            }
        } else if r.forward_tag(b"trailer").is_some() {
            r.skip_white_spaces_and_comments();
            if let Some(dict) = parse_dict(&mut r, &load.parse) {
                trailer_dicts.push(dict);
            }
        } else {
            r.forward();
        }
    }

    if table.len() == 0 {
        raise!("no objects found while repairing");
    }

    // Entry 0 is reserved.
    table.set(0, EntryKind::Free, 65535);

    // Prefer the last trailer carrying a Root; otherwise reconstruct one
    // from the catalog found by probing.
    let trailer = trailer_dicts
        .into_iter()
        .rev()
        .find(|d| d.contains_key(keys::ROOT))
        .unwrap_or_else(|| Dict::new(4));

    if !trailer.contains_key(keys::ROOT) {
        match catalog {
            Some((num, gen)) => trailer.put_key(
                keys::ROOT,
                Value::Ref(crate::object::ObjRef::new(num, gen, load.parse.doc.clone())),
            ),
            None => raise!("cannot recover trailer Root"),
        }
    }

    if !trailer.contains_key(keys::INFO) {
        if let Some((num, gen)) = info {
            trailer.put_key(
                keys::INFO,
                Value::Ref(crate::object::ObjRef::new(num, gen, load.parse.doc.clone())),
            );
        }
    }

    trailer.put_key(keys::SIZE, Value::Int(table.len() as i32));

    log::warn!("rebuilt xref table with {} entries", table.len());

    Ok((table, trailer))
}

/// Register the members of an object stream met during repair.
fn expand_object_stream(
    load: &LoadCtx<'_>,
    dict: &Dict,
    raw: &[u8],
    container: i32,
    table: &mut XrefTable,
) {
    let Ok(decoded) = decode_with_chain(raw, dict, load.registry, load.ctx) else {
        return;
    };

    let count = dict.get(keys::N).as_int();
    let mut r = Reader::new(&decoded);

    for index in 0..count {
        r.skip_white_spaces_and_comments();
        let Some(obj_num) = r.read_uint() else {
            return;
        };
        r.skip_white_spaces_and_comments();
        if r.read_uint().is_none() {
            return;
        }

        table.set(
            obj_num as i32,
            EntryKind::InStream {
                container,
                index,
            },
            0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_ctx<'a>(
        data: &'a [u8],
        registry: &'a FilterRegistry,
        ctx: &'a Context,
    ) -> LoadCtx<'a> {
        LoadCtx {
            data,
            parse: ParseCtx::detached(),
            registry,
            ctx,
        }
    }

    #[test]
    fn start_xref_is_found_backwards() {
        let data = b"junk startxref 5 more startxref\n 1234 \n%%EOF";
        assert_eq!(find_start_xref(data).unwrap(), 1234);
    }

    #[test]
    fn missing_start_xref_raises() {
        assert!(find_start_xref(b"no marker here").is_err());
    }

    #[test]
    fn classic_section() {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n");
        let obj_offset = pdf.len();
        pdf.extend_from_slice(b"1 0 obj 42 endobj\n");
        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{obj_offset:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let load = load_ctx(&pdf, &registry, &ctx);

        let mut table = XrefTable::new();
        let trailer = load_xref(&load, &mut table).unwrap();

        assert_eq!(trailer.get(keys::SIZE).as_int(), 2);
        assert_eq!(
            table.entry(1).unwrap().kind,
            EntryKind::InUse { offset: obj_offset }
        );
        assert_eq!(table.entry(0).unwrap().kind, EntryKind::Free);
    }

    #[test]
    fn nonfree_entry_zero_raises() {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n1 0 obj 1 endobj\n");
        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 1\n0000000009 00000 n \n");
        pdf.extend_from_slice(b"trailer\n<< /Size 1 >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let load = load_ctx(&pdf, &registry, &ctx);

        let mut table = XrefTable::new();
        assert!(load_xref(&load, &mut table).is_err());
    }

    #[test]
    fn offset_zero_normalizes_to_free() {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n1 0 obj 1 endobj\n");
        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n0000000000 00000 n \n");
        pdf.extend_from_slice(b"trailer\n<< /Size 2 >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let load = load_ctx(&pdf, &registry, &ctx);

        let mut table = XrefTable::new();
        load_xref(&load, &mut table).unwrap();
        assert_eq!(table.entry(1).unwrap().kind, EntryKind::Free);
    }

    #[test]
    fn uncompressed_xref_stream() {
        // A one-section xref stream with W [1 2 1] and three entries.
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 0, 0, 255]); // free
        body.extend_from_slice(&[1, 0, 20, 0]); // in use at 20
        body.extend_from_slice(&[2, 0, 9, 5]); // in stream 9, index 5

        let mut pdf: Vec<u8> = b"%PDF-1.5\nx".to_vec();
        let xref_offset = pdf.len();
        pdf.extend_from_slice(
            format!(
                "3 0 obj << /Type /XRef /Size 3 /W [1 2 1] /Length {} >> stream\n",
                body.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&body);
        pdf.extend_from_slice(b"\nendstream endobj\n");
        pdf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let load = load_ctx(&pdf, &registry, &ctx);

        let mut table = XrefTable::new();
        // Entry 2 references container 9 which is not in use, so validation
        // must reject the table.
        assert!(load_xref(&load, &mut table).is_err());

        // With the container entry present the same table loads.
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 0, 0, 255]);
        body.extend_from_slice(&[1, 0, 20, 0]);
        body.extend_from_slice(&[2, 0, 1, 5]);

        let mut pdf: Vec<u8> = b"%PDF-1.5\nx".to_vec();
        let xref_offset = pdf.len();
        pdf.extend_from_slice(
            format!(
                "3 0 obj << /Type /XRef /Size 3 /W [1 2 1] /Length {} >> stream\n",
                body.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&body);
        pdf.extend_from_slice(b"\nendstream endobj\n");
        pdf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

        let load = load_ctx(&pdf, &registry, &ctx);
        let mut table = XrefTable::new();
        load_xref(&load, &mut table).unwrap();

        assert_eq!(table.entry(1).unwrap().kind, EntryKind::InUse { offset: 20 });
        assert_eq!(
            table.entry(2).unwrap().kind,
            EntryKind::InStream {
                container: 1,
                index: 5
            }
        );
    }

    #[test]
    fn repair_finds_objects_and_root() {
        let pdf = b"garbage garbage
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj
more garbage %%EOF";

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let load = load_ctx(pdf, &registry, &ctx);

        let (table, trailer) = repair_xref(&load).unwrap();

        assert!(matches!(
            table.entry(1).unwrap().kind,
            EntryKind::InUse { .. }
        ));
        assert!(matches!(
            table.entry(2).unwrap().kind,
            EntryKind::InUse { .. }
        ));
        assert!(trailer.get_raw(keys::ROOT).is_some());
    }

    #[test]
    fn stream_extent_prefers_confirmed_length() {
        let data = b"<<>>stream\nabcdef\nendstream";
        let dict = Dict::new(1);
        dict.put_key(keys::LENGTH, Value::Int(6));

        let body = stream_extent(data, 11, &dict).unwrap();
        assert_eq!(body, b"abcdef");

        // A wrong length falls back to the endstream scan.
        dict.put_key(keys::LENGTH, Value::Int(100));
        let body = stream_extent(data, 11, &dict).unwrap();
        assert_eq!(body, b"abcdef");
    }
}
