//! The document outline (bookmarks).

use crate::document::Document;
use crate::object::name::keys;
use crate::object::{Dict, Value};
use rustc_hash::FxHashSet;

const MAX_OUTLINE_DEPTH: usize = 64;

/// A single outline item with its children.
pub struct OutlineItem {
    /// Title text, decoded leniently.
    pub title: String,
    /// The raw destination value (a name, string, array or action dict).
    pub dest: Value,
    pub children: Vec<OutlineItem>,
}

/// Walk `/Outlines`, or `None` when the document has none.
pub(crate) fn load_outline(doc: &Document) -> Option<Vec<OutlineItem>> {
    let root = doc.trailer().get(keys::ROOT).as_dict()?;
    let outlines = root.get(keys::OUTLINES).as_dict()?;

    let mut visited = FxHashSet::default();
    let items = walk_siblings(doc, &outlines.get_raw(keys::FIRST)?, &mut visited, 0);

    Some(items)
}

fn walk_siblings(
    doc: &Document,
    first: &Value,
    visited: &mut FxHashSet<(i32, i32)>,
    depth: usize,
) -> Vec<OutlineItem> {
    let mut items = Vec::new();

    if depth > MAX_OUTLINE_DEPTH {
        doc.context().warn("outline nests too deeply; truncating");
        return items;
    }

    let mut current = first.clone();

    loop {
        // The sibling chain is followed by reference identity so a loop in
        // a broken file terminates.
        if let Value::Ref(r) = &current {
            if !visited.insert((r.num, r.gen)) {
                doc.context().warn("circular outline; truncating");
                break;
            }
        }

        let Some(dict) = current.as_dict() else {
            break;
        };

        items.push(make_item(doc, &dict, visited, depth));

        match dict.get_raw(keys::NEXT) {
            Some(next) => current = next,
            None => break,
        }
    }

    items
}

fn make_item(
    doc: &Document,
    dict: &Dict,
    visited: &mut FxHashSet<(i32, i32)>,
    depth: usize,
) -> OutlineItem {
    let title = String::from_utf8_lossy(&dict.get(keys::TITLE).as_string()).into_owned();

    let dest = dict.get_raw(keys::DEST).unwrap_or(Value::Null);

    let children = match dict.get_raw(keys::FIRST) {
        Some(first) => walk_siblings(doc, &first, visited, depth + 1),
        None => Vec::new(),
    };

    OutlineItem {
        title,
        dest,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn outline_tree_loads() {
        let objects: Vec<(i32, String)> = vec![
            (1, "<< /Type /Catalog /Pages 2 0 R /Outlines 3 0 R >>".into()),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>".into()),
            (3, "<< /Type /Outlines /First 4 0 R /Last 5 0 R >>".into()),
            (4, "<< /Title (Chapter 1) /Next 5 0 R /First 6 0 R >>".into()),
            (5, "<< /Title (Chapter 2) >>".into()),
            (6, "<< /Title (Section 1.1) >>".into()),
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

        let doc = Document::open(Arc::new(pdf)).unwrap();
        let outline = doc.load_outline().unwrap();

        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].title, "Chapter 1");
        assert_eq!(outline[0].children.len(), 1);
        assert_eq!(outline[0].children[0].title, "Section 1.1");
        assert_eq!(outline[1].title, "Chapter 2");
        assert!(outline[1].children.is_empty());
    }
}
