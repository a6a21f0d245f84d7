//! Optional content groups (layers).
//!
//! Only the default configuration is honoured: `BaseState` plus the `ON`
//! and `OFF` arrays decide whether content tagged with a group is drawn.

use crate::document::Document;
use crate::object::name::keys;
use crate::object::Value;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub(crate) struct OcgDescriptor {
    states: FxHashMap<(i32, i32), bool>,
}

impl OcgDescriptor {
    /// Whether the group behind `reference` is visible. Unknown groups are
    /// visible.
    pub fn is_visible(&self, num: i32, gen: i32) -> bool {
        self.states.get(&(num, gen)).copied().unwrap_or(true)
    }
}

/// Read `/OCProperties` from the catalog; absent means no descriptor.
pub(crate) fn read_ocg(doc: &Document) -> Option<OcgDescriptor> {
    let root = doc.trailer().get(keys::ROOT).as_dict()?;
    let properties = root.get(b"OCProperties").as_dict()?;

    let groups = properties.get(b"OCGs").as_array()?;
    let config = properties.get(keys::D).as_dict().unwrap_or_default();

    let base_on = match &*config.get(b"BaseState").as_name() {
        b"OFF" => false,
        // Default to ON, including for "Unchanged".
        _ => true,
    };

    let mut descriptor = OcgDescriptor::default();

    for i in 0..groups.len() {
        if let Value::Ref(r) = groups.get_raw(i) {
            descriptor.states.insert((r.num, r.gen), base_on);
        }
    }

    for (key, state) in [(b"ON".as_ref(), true), (b"OFF".as_ref(), false)] {
        let Some(list) = config.get(key).as_array() else {
            continue;
        };

        for i in 0..list.len() {
            if let Value::Ref(r) = list.get_raw(i) {
                descriptor.states.insert((r.num, r.gen), state);
            }
        }
    }

    Some(descriptor)
}
