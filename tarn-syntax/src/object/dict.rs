//! Dictionary objects.
//!
//! Entries live in insertion order and are searched linearly while the
//! dictionary holds at most 100 entries. The first operation past that
//! point sorts the entries by name and flips the `sorted` flag; from then
//! on lookups binary-probe and insertions keep the order. Deletion is the
//! cheap variant: swap with the last entry and un-mark sorted.

use crate::object::{Name, Value};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Linear search is used up to this many entries.
const SORT_LIMIT: usize = 100;

struct Repr {
    pairs: Vec<(Name, Value)>,
    sorted: bool,
    /// Single-bit visit mark used to break cycles during traversal.
    marked: bool,
}

/// A name-keyed map of values. Keys are unique.
#[derive(Clone)]
pub struct Dict(Arc<RwLock<Repr>>);

impl Dict {
    /// Create an empty dictionary with a capacity hint.
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(RwLock::new(Repr {
            pairs: Vec::with_capacity(capacity),
            sorted: false,
            marked: false,
        })))
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap().pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().unwrap().pairs.is_empty()
    }

    /// Whether the entries are currently sorted by name.
    pub fn is_sorted(&self) -> bool {
        self.0.read().unwrap().sorted
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get_raw(key).is_some()
    }

    /// Look up `key` and resolve the result. Null when absent.
    pub fn get(&self, key: &[u8]) -> Value {
        self.get_raw(key).map(|v| v.resolve()).unwrap_or(Value::Null)
    }

    /// Look up `key` without resolving indirect references.
    pub fn get_raw(&self, key: &[u8]) -> Option<Value> {
        {
            let repr = self.0.read().unwrap();

            if repr.sorted {
                return find_sorted(&repr.pairs, key).map(|i| repr.pairs[i].1.clone());
            }

            if repr.pairs.len() <= SORT_LIMIT {
                return find_linear(&repr.pairs, key).map(|i| repr.pairs[i].1.clone());
            }
        }

        // Large and unsorted: sort once, then probe.
        let mut repr = self.0.write().unwrap();
        sort(&mut repr);

        find_sorted(&repr.pairs, key).map(|i| repr.pairs[i].1.clone())
    }

    /// Insert or replace an entry under a raw byte key.
    pub fn put_key(&self, key: &[u8], value: Value) {
        self.put(Name::new(key), value);
    }

    /// Insert or replace an entry.
    pub fn put(&self, key: Name, value: Value) {
        let mut repr = self.0.write().unwrap();

        if repr.sorted {
            match repr
                .pairs
                .binary_search_by(|(n, _)| n.as_ref().cmp(key.as_ref()))
            {
                Ok(i) => repr.pairs[i].1 = value,
                Err(i) => repr.pairs.insert(i, (key, value)),
            }
        } else {
            match find_linear(&repr.pairs, &key) {
                Some(i) => repr.pairs[i].1 = value,
                None => repr.pairs.push((key, value)),
            }

            if repr.pairs.len() > SORT_LIMIT {
                sort(&mut repr);
            }
        }
    }

    /// Cheap delete: swap with the last entry and un-mark sorted.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut repr = self.0.write().unwrap();

        let index = if repr.sorted {
            find_sorted(&repr.pairs, key)
        } else {
            find_linear(&repr.pairs, key)
        };

        match index {
            Some(i) => {
                repr.pairs.swap_remove(i);
                repr.sorted = false;
                true
            }
            None => false,
        }
    }

    /// A snapshot of the keys in storage order.
    pub fn keys(&self) -> Vec<Name> {
        self.0
            .read()
            .unwrap()
            .pairs
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// A snapshot of the entries in storage order, unresolved.
    pub fn entries(&self) -> Vec<(Name, Value)> {
        self.0.read().unwrap().pairs.clone()
    }

    /// Set the visit mark; returns `false` if it was already set.
    pub(crate) fn mark(&self) -> bool {
        let mut repr = self.0.write().unwrap();

        if repr.marked {
            false
        } else {
            repr.marked = true;
            true
        }
    }

    pub(crate) fn unmark(&self) {
        self.0.write().unwrap().marked = false;
    }

    pub(crate) fn ptr_eq(&self, other: &Dict) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new(0)
    }
}

fn find_linear(pairs: &[(Name, Value)], key: &[u8]) -> Option<usize> {
    pairs.iter().position(|(n, _)| n.as_ref() == key)
}

fn find_sorted(pairs: &[(Name, Value)], key: &[u8]) -> Option<usize> {
    pairs.binary_search_by(|(n, _)| n.as_ref().cmp(key)).ok()
}

fn sort(repr: &mut Repr) {
    repr.pairs.sort_by(|(a, _), (b, _)| a.as_ref().cmp(b.as_ref()));
    repr.sorted = true;
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.mark() {
            return write!(f, "<<...>>");
        }

        let result = {
            let repr = self.0.read().unwrap();
            let mut map = f.debug_map();

            for (name, value) in &repr.pairs {
                map.entry(&name.as_str(), value);
            }

            map.finish()
        };

        self.unmark();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let d = Dict::new(2);
        d.put_key(b"A", Value::Int(1));
        d.put_key(b"B", Value::Bool(true));

        assert_eq!(d.get(b"A").as_int(), 1);
        assert!(d.get(b"B").as_bool());
        assert!(matches!(d.get(b"C"), Value::Null));
    }

    #[test]
    fn put_replaces_existing_key() {
        let d = Dict::new(1);
        d.put_key(b"A", Value::Int(1));
        d.put_key(b"A", Value::Int(2));

        assert_eq!(d.len(), 1);
        assert_eq!(d.get(b"A").as_int(), 2);
    }

    #[test]
    fn sorts_past_one_hundred_entries() {
        let d = Dict::new(0);

        for i in 0..100 {
            d.put_key(format!("K{i:03}").as_bytes(), Value::Int(i));
        }
        assert!(!d.is_sorted());

        d.put_key(b"K100", Value::Int(100));
        assert!(d.is_sorted());

        // Lookups and inserts keep working after the switch.
        assert_eq!(d.get(b"K042").as_int(), 42);
        d.put_key(b"AAA", Value::Int(-1));
        assert!(d.is_sorted());
        assert_eq!(d.get(b"AAA").as_int(), -1);
    }

    #[test]
    fn delete_clears_sorted_flag() {
        let d = Dict::new(0);
        for i in 0..101 {
            d.put_key(format!("K{i:03}").as_bytes(), Value::Int(i));
        }
        assert!(d.is_sorted());

        assert!(d.delete(b"K050"));
        assert!(!d.is_sorted());
        assert!(matches!(d.get(b"K050"), Value::Null));
        assert_eq!(d.len(), 100);

        assert!(!d.delete(b"K050"));
    }

    #[test]
    fn visit_mark_breaks_cycles() {
        let d = Dict::new(1);
        d.put_key(b"Self", Value::Dict(d.clone()));

        // Debug formatting must terminate.
        let s = format!("{d:?}");
        assert!(s.contains("..."));
    }
}
