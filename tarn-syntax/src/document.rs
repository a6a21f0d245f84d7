//! Opening documents and lazily loading objects.

use crate::context::Context;
use crate::crypt::Crypt;
use crate::error::{Error, Result};
use crate::filter::{decode_with_chain, FilterRegistry, StreamFilter};
use crate::object::name::keys;
use crate::object::parse::{parse_indirect_header, parse_value, ParseCtx};
use crate::object::{Dict, Value};
use crate::ocg::{self, OcgDescriptor};
use crate::outline::{self, OutlineItem};
use crate::page::{self, Page};
use crate::raise;
use crate::reader::Reader;
use crate::store::StoreKey;
use crate::sync::LockId;
use crate::xref::{self, EntryKind, LoadCtx, XrefTable};
use crate::PdfData;
use kurbo::Rect;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// How far into the file the `%PDF-` marker may sit.
const VERSION_WINDOW: usize = 1024;

static NEXT_GENERATION: AtomicI32 = AtomicI32::new(1);

pub(crate) struct DocumentRepr {
    data: PdfData,
    ctx: Context,
    registry: RwLock<FilterRegistry>,
    version: AtomicI32,
    repaired: AtomicBool,
    xref: RwLock<XrefTable>,
    trailer: RwLock<Dict>,
    crypt: RwLock<Option<Crypt>>,
    pages: RwLock<Option<Arc<Vec<Page>>>>,
    ocg: RwLock<Option<Option<Arc<OcgDescriptor>>>>,
    /// Store generation for cached stream data; retired on drop.
    generation: i32,
}

impl Drop for DocumentRepr {
    fn drop(&mut self) {
        self.ctx.store().drop_generation(self.generation);
        self.ctx.warnings().flush();
    }
}

/// A non-owning link from values back to their document.
pub(crate) type DocLink = Weak<DocumentRepr>;

/// An open PDF document.
///
/// Cloning is cheap and shares all state, including the object cache.
#[derive(Clone)]
pub struct Document(Arc<DocumentRepr>);

impl Document {
    /// Open a document with a fresh [`Context`].
    pub fn open(data: PdfData) -> Result<Self> {
        Self::open_with_context(data, Context::new())
    }

    /// Open a document inside an existing context.
    pub fn open_with_context(data: PdfData, ctx: Context) -> Result<Self> {
        let doc = Self(Arc::new(DocumentRepr {
            data,
            ctx,
            registry: RwLock::new(FilterRegistry::with_builtins()),
            version: AtomicI32::new(0),
            repaired: AtomicBool::new(false),
            xref: RwLock::new(XrefTable::new()),
            trailer: RwLock::new(Dict::new(0)),
            crypt: RwLock::new(None),
            pages: RwLock::new(None),
            ocg: RwLock::new(None),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }));

        doc.load_structure()?;

        Ok(doc)
    }

    pub(crate) fn from_repr(repr: Arc<DocumentRepr>) -> Self {
        Self(repr)
    }

    fn bytes(&self) -> &[u8] {
        self.0.data.as_ref().as_ref()
    }

    pub(crate) fn parse_ctx(&self) -> ParseCtx {
        ParseCtx::new(Arc::downgrade(&self.0))
    }

    /// Version as major·10 + minor (`%PDF-1.7` is 17).
    pub fn version(&self) -> i32 {
        self.0.version.load(Ordering::Relaxed)
    }

    /// Whether the xref had to be rebuilt from a linear scan.
    pub fn is_repaired(&self) -> bool {
        self.0.repaired.load(Ordering::Relaxed)
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn trailer(&self) -> Dict {
        self.0.trailer.read().unwrap().clone()
    }

    /// The number of slots in the object index.
    pub fn count_objects(&self) -> usize {
        self.0.xref.read().unwrap().len()
    }

    /// Register a stream filter under a name; the extension point for
    /// codecs the core does not carry (DCT, JBIG2, CCITT, JPX, LZW).
    pub fn with_filter(&self, name: &[u8], filter: Arc<dyn StreamFilter>) {
        self.0.registry.write().unwrap().register(name, filter);
    }

    /// Whether the document is encrypted and still lacks a valid password.
    pub fn needs_password(&self) -> bool {
        match &*self.0.crypt.read().unwrap() {
            Some(crypt) => !crypt.is_authenticated(),
            None => false,
        }
    }

    /// Try a password. Cryptographic failure is a `false`, never an error.
    pub fn authenticate(&self, password: &[u8]) -> bool {
        match &mut *self.0.crypt.write().unwrap() {
            Some(crypt) => crypt.authenticate(password),
            None => true,
        }
    }

    /// Parse version, xref chain and encryption; repairs once on failure.
    fn load_structure(&self) -> Result<()> {
        let version = find_version(self.bytes())?;
        self.0.version.store(version, Ordering::Relaxed);

        if !(10..=17).contains(&version) {
            self.0
                .ctx
                .warn(&format!("unknown PDF version {version}; proceeding anyway"));
        }

        let _file = self.0.ctx.locks().lock(LockId::File);

        {
            let registry = self.0.registry.read().unwrap();
            let load = LoadCtx {
                data: self.bytes(),
                parse: self.parse_ctx(),
                registry: &registry,
                ctx: &self.0.ctx,
            };

            let mut table = XrefTable::new();
            let trailer = match xref::load_xref(&load, &mut table) {
                Ok(trailer) => trailer,
                Err(err) => {
                    self.0.ctx.warn(&format!("cannot load xref ({err})"));
                    self.0.repaired.store(true, Ordering::Relaxed);

                    let (repaired_table, repaired_trailer) = xref::repair_xref(&load)
                        .map_err(|e| Error::unrecoverable(format!("repair failed: {e}")))?;
                    table = repaired_table;
                    repaired_trailer
                }
            };

            *self.0.xref.write().unwrap() = table;
            *self.0.trailer.write().unwrap() = trailer;
        }

        // The encryption gate. Objects resolved up to here (the Encrypt
        // dictionary itself, the file ID) are never encrypted.
        let trailer = self.trailer();
        if let Some(encrypt_dict) = trailer.get(keys::ENCRYPT).as_dict() {
            let id = trailer
                .get(keys::ID)
                .as_array()
                .map(|a| a.get(0).as_string().to_vec())
                .unwrap_or_default();

            let mut crypt = Crypt::new(&encrypt_dict, &id);

            if !crypt.authenticate(b"") {
                self.0.ctx.warn(
                    "encrypted document rejected the empty password; only metadata is available",
                );
            }

            *self.0.crypt.write().unwrap() = Some(crypt);
        }

        Ok(())
    }

    /// Load (and cache) the object with the given number.
    ///
    /// Successive calls return clones of the same shared value.
    pub fn load_object(&self, num: i32, gen: i32) -> Result<Value> {
        if self.0.ctx.locks().is_held(LockId::File) {
            self.load_object_inner(num, gen)
        } else {
            let _file = self.0.ctx.locks().lock(LockId::File);
            self.load_object_inner(num, gen)
        }
    }

    fn load_object_inner(&self, num: i32, gen: i32) -> Result<Value> {
        let len = self.count_objects();

        if num < 0 || num as usize >= len {
            raise!("object out of range ({num} {gen} R); xref size {len}");
        }

        let (cached, kind) = {
            let table = self.0.xref.read().unwrap();
            let entry = table.entry(num).unwrap();
            (entry.cached.clone(), entry.kind.clone())
        };

        if let Some(value) = cached {
            return Ok(value);
        }

        match kind {
            EntryKind::Free | EntryKind::Unset => {
                self.cache_value(num, Value::Null);
                Ok(Value::Null)
            }
            EntryKind::InUse { offset } => {
                let mut r = Reader::new_at(self.bytes(), offset);
                r.skip_white_spaces_and_comments();

                let Some((rnum, rgen)) = parse_indirect_header(&mut r) else {
                    raise!("cannot parse object ({num} {gen} R)");
                };

                if rnum != num {
                    raise!("found object ({rnum} {rgen} R) instead of ({num} {gen} R)");
                }

                r.skip_white_spaces_and_comments();
                let Some(mut value) = parse_value(&mut r, &self.parse_ctx()) else {
                    raise!("cannot parse object body ({num} {gen} R)");
                };

                r.skip_white_spaces_and_comments();
                if r.forward_tag(b"stream").is_some() {
                    r.forward_if(|b| b == b'\r');
                    r.forward_if(|b| b == b'\n');

                    let mut table = self.0.xref.write().unwrap();
                    table.entry_mut(num).unwrap().stream_offset = Some(r.offset());
                }

                if let Some(crypt) = &*self.0.crypt.read().unwrap() {
                    if crypt.is_authenticated() {
                        value = crypt.decrypt_value(value, num, rgen);
                    }
                }

                self.cache_value(num, value.clone());
                Ok(value)
            }
            EntryKind::InStream { container, index: _ } => {
                self.load_from_object_stream(container, num)
            }
        }
    }

    fn cache_value(&self, num: i32, value: Value) {
        let mut table = self.0.xref.write().unwrap();
        if let Some(entry) = table.entry_mut(num) {
            entry.cached = Some(value);
        }
    }

    /// Load an object stream and cache every member it defines; return the
    /// member that was asked for. A failure here leaves previously cached
    /// members untouched.
    fn load_from_object_stream(&self, container: i32, wanted: i32) -> Result<Value> {
        let Some(container_dict) = self.load_object_inner(container, 0)?.as_dict() else {
            raise!("object stream ({container} 0 R) is not a stream");
        };

        let data = self.load_stream_inner(container)?;

        let count = container_dict.get(keys::N).as_int();
        let first = container_dict.get(keys::FIRST).as_int();

        if count <= 0 || first < 0 {
            raise!("corrupt object stream ({container} 0 R)");
        }

        let mut r = Reader::new(&data);
        let mut members = Vec::with_capacity(count as usize);

        for _ in 0..count {
            r.skip_white_spaces_and_comments();
            let Some(obj_num) = r.read_uint() else {
                raise!("corrupt object stream header ({container} 0 R)");
            };
            r.skip_white_spaces_and_comments();
            let Some(rel_offset) = r.read_uint() else {
                raise!("corrupt object stream header ({container} 0 R)");
            };

            members.push((obj_num as i32, first as usize + rel_offset as usize));
        }

        let parse = self.parse_ctx();

        for (member_num, offset) in members {
            // Only populate slots that actually point into this container;
            // shadowed numbers belong to newer sections.
            let belongs = {
                let table = self.0.xref.read().unwrap();
                matches!(
                    table.entry(member_num).map(|e| &e.kind),
                    Some(EntryKind::InStream { container: c, .. }) if *c == container
                )
            };

            if !belongs {
                continue;
            }

            let already_cached = {
                let table = self.0.xref.read().unwrap();
                table
                    .entry(member_num)
                    .is_some_and(|e| e.cached.is_some())
            };

            if already_cached {
                continue;
            }

            let mut rr = Reader::new_at(&data, offset.min(data.len()));
            rr.skip_white_spaces_and_comments();

            match parse_value(&mut rr, &parse) {
                Some(value) => self.cache_value(member_num, value),
                None => self
                    .0
                    .ctx
                    .warn(&format!("cannot parse object {member_num} in object stream {container}")),
            }
        }

        let cached = {
            let table = self.0.xref.read().unwrap();
            table.entry(wanted).and_then(|e| e.cached.clone())
        };

        match cached {
            Some(value) => Ok(value),
            None => raise!("object ({wanted} 0 R) was not found in its object stream"),
        }
    }

    /// Decoded content of the stream object `num`. Cached in the store.
    pub fn load_stream(&self, num: i32) -> Result<Arc<[u8]>> {
        if self.0.ctx.locks().is_held(LockId::File) {
            self.load_stream_inner(num)
        } else {
            let _file = self.0.ctx.locks().lock(LockId::File);
            self.load_stream_inner(num)
        }
    }

    fn load_stream_inner(&self, num: i32) -> Result<Arc<[u8]>> {
        let key = StoreKey::new(self.0.generation, num.max(0) as u64);

        if let Some(hit) = self.0.ctx.store().get(key) {
            return Ok(hit);
        }

        let gen = self
            .0
            .xref
            .read()
            .unwrap()
            .entry(num)
            .map(|e| e.gen)
            .unwrap_or(0);

        let value = self.load_object_inner(num, gen)?;

        let Some(dict) = value.as_dict() else {
            raise!("object ({num} {gen} R) is not a stream");
        };

        let offset = {
            let table = self.0.xref.read().unwrap();
            table.entry(num).and_then(|e| e.stream_offset)
        };

        let Some(offset) = offset else {
            raise!("object ({num} {gen} R) has no stream body");
        };

        let raw = xref::stream_extent(self.bytes(), offset, &dict)?;

        let decrypted;
        let raw = match &*self.0.crypt.read().unwrap() {
            Some(crypt) if crypt.is_authenticated() => {
                decrypted = crypt.decrypt(num, gen, raw);
                &decrypted[..]
            }
            _ => raw,
        };

        let registry = self.0.registry.read().unwrap();
        let decoded = decode_with_chain(raw, &dict, &registry, &self.0.ctx)?;

        let arc: Arc<[u8]> = decoded.into();
        self.0.ctx.store().put(key, arc.clone());

        Ok(arc)
    }

    /// The flattened page list, built on first use.
    fn pages(&self) -> Arc<Vec<Page>> {
        if let Some(pages) = &*self.0.pages.read().unwrap() {
            return pages.clone();
        }

        let pages = Arc::new(page::flatten(self));
        *self.0.pages.write().unwrap() = Some(pages.clone());
        pages
    }

    pub fn count_pages(&self) -> usize {
        self.pages().len()
    }

    pub fn page(&self, index: usize) -> Option<Page> {
        self.pages().get(index).cloned()
    }

    /// The page's media box in default user space.
    pub fn bound_page(&self, index: usize) -> Option<Rect> {
        self.page(index).map(|p| p.media_box())
    }

    /// The document outline, or `None` when there is none.
    pub fn load_outline(&self) -> Option<Vec<OutlineItem>> {
        outline::load_outline(self)
    }

    /// Whether the optional-content group behind a reference is visible
    /// under the default configuration. Content outside any group, and
    /// groups the catalog does not describe, are visible.
    pub fn is_ocg_visible(&self, num: i32, gen: i32) -> bool {
        let descriptor = {
            let cached = self.0.ocg.read().unwrap().clone();
            match cached {
                Some(d) => d,
                None => {
                    let loaded = ocg::read_ocg(self).map(Arc::new);
                    *self.0.ocg.write().unwrap() = Some(loaded.clone());
                    loaded
                }
            }
        };

        match descriptor {
            Some(d) => d.is_visible(num, gen),
            None => true,
        }
    }
}

/// Locate `%PDF-M.N` near the start of the file.
fn find_version(data: &[u8]) -> Result<i32> {
    let window = &data[..data.len().min(VERSION_WINDOW)];
    let needle = b"%PDF-";

    let Some(pos) = window
        .windows(needle.len())
        .position(|w| w == needle)
    else {
        raise!("cannot recognize version marker");
    };

    let mut r = Reader::new_at(data, pos + needle.len());
    let major = r.read_uint().unwrap_or(1) as i32;
    r.forward_if(|b| b == b'.');
    let minor = r.read_uint().unwrap_or(0) as i32;

    Ok(major * 10 + minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A small but complete two-page document with a classic xref.
    pub(crate) fn two_page_pdf() -> Vec<u8> {
        let objects: Vec<(i32, String)> = vec![
            (1, "<< /Type /Catalog /Pages 2 0 R >>".into()),
            (
                2,
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] >>".into(),
            ),
            (3, "<< /Type /Page /Parent 2 0 R >>".into()),
            (
                4,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >>".into(),
            ),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = vec![0usize; objects.len() + 1];

        for (num, body) in &objects {
            offsets[*num as usize] = pdf.len();
            pdf.extend_from_slice(format!("{num} 0 obj {body} endobj\n").as_bytes());
        }

        let xref_offset = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..=objects.len() {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offsets[num]).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
                objects.len() + 1,
                xref_offset
            )
            .as_bytes(),
        );

        pdf
    }

    #[test]
    fn open_and_walk_pages() {
        let doc = Document::open(Arc::new(two_page_pdf())).unwrap();

        assert_eq!(doc.version(), 14);
        assert!(!doc.is_repaired());
        assert_eq!(doc.count_pages(), 2);

        // Page 0 inherits the tree's media box, page 1 overrides it.
        let b0 = doc.bound_page(0).unwrap();
        assert_eq!((b0.x1, b0.y1), (612.0, 792.0));
        let b1 = doc.bound_page(1).unwrap();
        assert_eq!((b1.x1, b1.y1), (200.0, 100.0));
    }

    #[test]
    fn cached_objects_are_shared() {
        let doc = Document::open(Arc::new(two_page_pdf())).unwrap();

        let a = doc.load_object(2, 0).unwrap();
        let b = doc.load_object(2, 0).unwrap();

        let (Some(da), Some(db)) = (a.as_dict(), b.as_dict()) else {
            panic!("expected dictionaries");
        };
        assert!(da.ptr_eq(&db));
    }

    #[test]
    fn missing_version_header_fails_open() {
        let err = Document::open(Arc::new(b"not a pdf at all".to_vec()));
        assert!(err.is_err());
    }

    #[test]
    fn broken_startxref_engages_repair() {
        let mut pdf = two_page_pdf();

        // Point startxref far past the end of the file.
        let pos = pdf.windows(9).rposition(|w| w == b"startxref").unwrap();
        pdf.truncate(pos);
        pdf.extend_from_slice(b"startxref\n99999999\n%%EOF");

        let doc = Document::open(Arc::new(pdf)).unwrap();
        assert!(doc.is_repaired());
        assert_eq!(doc.count_pages(), 2);
        assert!(doc.load_outline().is_none());
    }

    #[test]
    fn reference_resolution_through_document() {
        let doc = Document::open(Arc::new(two_page_pdf())).unwrap();

        let root = doc.trailer().get(keys::ROOT);
        let dict = root.as_dict().unwrap();
        assert_eq!(&*dict.get(keys::TYPE).as_name(), keys::CATALOG);
    }

    #[test]
    fn indirect_cycle_resolves_to_null() {
        // 1 0 obj and 2 0 obj reference each other.
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let o1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj 2 0 R endobj\n");
        let o2 = pdf.len();
        pdf.extend_from_slice(b"2 0 obj 1 0 R endobj\n");
        let o3 = pdf.len();
        pdf.extend_from_slice(b"3 0 obj << /Type /Catalog >> endobj\n");
        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
        for ofs in [o1, o2, o3] {
            pdf.extend_from_slice(format!("{ofs:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!("trailer\n<< /Size 4 /Root 3 0 R >>\nstartxref\n{xref_offset}\n%%EOF")
                .as_bytes(),
        );

        let doc = Document::open(Arc::new(pdf)).unwrap();
        let v = doc.load_object(1, 0).unwrap();

        // No stack overflow; the chase gives up with null.
        assert!(matches!(v.resolve(), Value::Null));
    }

    #[test]
    fn object_stream_members_load() {
        // Objects 4 and 5 packed into object stream 3.
        let member_data = b"<< /A 1 >> << /B 2 >>";
        let header = b"4 0 5 11 ";
        let mut body = header.to_vec();
        body.extend_from_slice(member_data);

        let mut pdf = b"%PDF-1.5\n".to_vec();
        let o1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = pdf.len();
        pdf.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n");
        let o3 = pdf.len();
        pdf.extend_from_slice(
            format!(
                "3 0 obj << /Type /ObjStm /N 2 /First {} /Length {} >> stream\n",
                header.len(),
                body.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&body);
        pdf.extend_from_slice(b"\nendstream endobj\n");

        let xref_offset = pdf.len();
        pdf.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
        for ofs in [o1, o2, o3] {
            pdf.extend_from_slice(format!("{ofs:010} 00000 n \n").as_bytes());
        }
        // Classic 'o' entries: offset column is the container, gen column
        // the index.
        pdf.extend_from_slice(format!("{:010} 00000 o \n", 3).as_bytes());
        pdf.extend_from_slice(format!("{:010} 00001 o \n", 3).as_bytes());
        pdf.extend_from_slice(
            format!("trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF")
                .as_bytes(),
        );

        let doc = Document::open(Arc::new(pdf)).unwrap();

        let four = doc.load_object(4, 0).unwrap();
        assert_eq!(four.as_dict().unwrap().get(b"A").as_int(), 1);

        let five = doc.load_object(5, 0).unwrap();
        assert_eq!(five.as_dict().unwrap().get(b"B").as_int(), 2);
    }
}
