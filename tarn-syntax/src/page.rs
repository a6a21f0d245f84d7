//! Walking the page tree.

use crate::document::Document;
use crate::error::Result;
use crate::geom::normalize_rect;
use crate::object::name::keys;
use crate::object::{Dict, Value};
use kurbo::Rect;
use rustc_hash::FxHashSet;

/// Fallback media box (US letter) for pages that carry none.
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// How deep a Kids chain may nest before the walk gives up.
const MAX_TREE_DEPTH: usize = 256;

/// One page of a document, with its inherited attributes resolved.
#[derive(Clone)]
pub struct Page {
    dict: Dict,
    media_box: Rect,
    crop_box: Rect,
    rotate: i32,
    resources: Dict,
}

impl Page {
    /// The page dictionary itself.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// The media box in default user space, normalized.
    pub fn media_box(&self) -> Rect {
        self.media_box
    }

    /// The crop box, clipped to the media box.
    pub fn crop_box(&self) -> Rect {
        self.crop_box
    }

    /// Clockwise rotation in degrees, one of 0/90/180/270.
    pub fn rotate(&self) -> i32 {
        self.rotate
    }

    /// The effective resource dictionary (own or inherited).
    pub fn resources(&self) -> Dict {
        self.resources.clone()
    }

    /// The assembled content stream. A Contents array is joined with
    /// single spaces, because streams need not end on a token boundary.
    pub fn content(&self, doc: &Document) -> Result<Vec<u8>> {
        let contents = self.dict.get_raw(keys::CONTENTS).unwrap_or(Value::Null);

        let mut out = Vec::new();

        match &contents {
            Value::Ref(r) => match contents.resolve() {
                Value::Array(_) => collect_array(doc, &contents, &mut out)?,
                _ => out.extend_from_slice(&doc.load_stream(r.num)?),
            },
            Value::Array(_) => collect_array(doc, &contents, &mut out)?,
            Value::Null => {
                doc.context().warn("page has no content stream");
            }
            other => {
                doc.context()
                    .warn(&format!("page contents have kind {}", other.kind()));
            }
        }

        Ok(out)
    }
}

fn collect_array(doc: &Document, contents: &Value, out: &mut Vec<u8>) -> Result<()> {
    let Some(array) = contents.as_array() else {
        return Ok(());
    };

    for i in 0..array.len() {
        if let Value::Ref(r) = array.get_raw(i) {
            out.extend_from_slice(&doc.load_stream(r.num)?);
            out.push(b' ');
        }
    }

    Ok(())
}

#[derive(Clone, Default)]
struct Inherited {
    media_box: Option<Rect>,
    crop_box: Option<Rect>,
    rotate: Option<i32>,
    resources: Option<Dict>,
}

/// Flatten the page tree into a page list, inheriting attributes downward.
pub(crate) fn flatten(doc: &Document) -> Vec<Page> {
    let mut pages = Vec::new();

    let root = doc.trailer().get(keys::ROOT);
    let Some(root_dict) = root.as_dict() else {
        doc.context().warn("document has no catalog");
        return pages;
    };

    let Some(tree) = root_dict.get(keys::PAGES).as_dict() else {
        doc.context().warn("catalog has no page tree");
        return pages;
    };

    let mut visited = FxHashSet::default();
    walk(doc, &tree, Inherited::default(), &mut visited, &mut pages, 0);

    pages
}

fn walk(
    doc: &Document,
    node: &Dict,
    mut inherited: Inherited,
    visited: &mut FxHashSet<(i32, i32)>,
    pages: &mut Vec<Page>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        doc.context().warn("page tree nests too deeply; truncating");
        return;
    }

    if let Some(rect) = read_rect(node, keys::MEDIA_BOX) {
        inherited.media_box = Some(rect);
    }
    if let Some(rect) = read_rect(node, keys::CROP_BOX) {
        inherited.crop_box = Some(rect);
    }
    match node.get(keys::ROTATE) {
        Value::Int(r) => inherited.rotate = Some(r),
        _ => {}
    }
    if let Some(resources) = node.get(keys::RESOURCES).as_dict() {
        inherited.resources = Some(resources);
    }

    let Some(kids) = node.get(keys::KIDS).as_array() else {
        doc.context().warn("page tree node has no Kids");
        return;
    };

    for i in 0..kids.len() {
        let raw = kids.get_raw(i);

        // Cycle protection keys on the reference identity of each kid.
        if let Value::Ref(r) = &raw {
            if !visited.insert((r.num, r.gen)) {
                doc.context().warn("circular page tree; skipping repeated node");
                continue;
            }
        }

        let Some(kid) = raw.as_dict() else {
            continue;
        };

        let kid_type = kid.get(keys::TYPE).as_name();

        if &*kid_type == keys::PAGES {
            walk(doc, &kid, inherited.clone(), visited, pages, depth + 1);
        } else {
            // Anything that is not an inner node is taken as a page;
            // missing /Type /Page markers are a known producer defect.
            pages.push(make_page(&kid, &inherited));
        }
    }
}

fn make_page(dict: &Dict, inherited: &Inherited) -> Page {
    let media_box = read_rect(dict, keys::MEDIA_BOX)
        .or(inherited.media_box)
        .unwrap_or(DEFAULT_MEDIA_BOX);

    let crop_box = read_rect(dict, keys::CROP_BOX)
        .or(inherited.crop_box)
        .unwrap_or(media_box);
    let crop_box = crop_box.intersect(media_box);

    let rotate = match dict.get(keys::ROTATE) {
        Value::Int(r) => r,
        _ => inherited.rotate.unwrap_or(0),
    };
    let rotate = rotate.rem_euclid(360) / 90 * 90;

    let resources = dict
        .get(keys::RESOURCES)
        .as_dict()
        .or_else(|| inherited.resources.clone())
        .unwrap_or_default();

    Page {
        dict: dict.clone(),
        media_box,
        crop_box,
        rotate,
        resources,
    }
}

fn read_rect(dict: &Dict, key: &[u8]) -> Option<Rect> {
    let array = dict.get(key).as_array()?;
    let v = array.to_floats();

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
