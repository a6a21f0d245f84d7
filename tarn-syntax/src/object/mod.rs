//! The dynamic PDF object model.
//!
//! A [`Value`] is a tagged variant over the nine PDF object kinds. Values
//! are shared, not copied, on assignment into containers: cloning an array
//! or dictionary clones a handle to the same storage, and dropping the last
//! handle frees the children recursively. The C original's keep/drop pair
//! is exactly [`Clone`]/[`Drop`] here.
//!
//! Accessors are total: asking a boolean for its integer value yields the
//! tag's zero value (and a deduplicated warning), never an error. Raising
//! is reserved for parse-time structural problems.

use crate::document::{DocLink, Document};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub mod array;
pub mod dict;
pub mod name;
pub mod parse;
pub mod print;

pub use array::Array;
pub use dict::Dict;
pub use name::Name;

/// How many indirections [`Value::resolve`] chases before declaring a cycle.
const MAX_INDIRECTIONS: u32 = 10;

/// A byte string. May contain NULs; not necessarily text.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PdfString(Arc<[u8]>);

impl PdfString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Vec::new().into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for PdfString {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", String::from_utf8_lossy(&self.0))
    }
}

/// An indirect reference: object number, generation, and a non-owning link
/// to the document it belongs to.
///
/// The link is non-owning so a reference can never keep its document alive;
/// resolving after the document is gone yields null with a warning.
#[derive(Clone)]
pub struct ObjRef {
    pub num: i32,
    pub gen: i32,
    pub(crate) doc: DocLink,
}

impl ObjRef {
    pub(crate) fn new(num: i32, gen: i32, doc: DocLink) -> Self {
        Self { num, gen, doc }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num && self.gen == other.gen
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.gen)
    }
}

/// A dynamic PDF value.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Real(f32),
    String(PdfString),
    Name(Name),
    Array(Array),
    Dict(Dict),
    Ref(ObjRef),
}

impl Value {
    /// The kind of value, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Name(_) => "name",
            Value::Array(_) => "array",
            Value::Dict(_) => "dictionary",
            Value::Ref(_) => "reference",
        }
    }

    /// Whether this value is an indirect reference (tested on the raw tag).
    pub fn is_indirect(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// Chase indirect references, at most [`MAX_INDIRECTIONS`] hops.
    ///
    /// On a cycle, a dangling document link, or an unreadable target this
    /// returns null and warns. Once the result is not a reference, resolving
    /// again is the identity.
    pub fn resolve(&self) -> Value {
        let mut current = self.clone();
        let mut sanity = MAX_INDIRECTIONS;

        while let Value::Ref(r) = &current {
            if sanity == 0 {
                log::warn!(
                    "too many indirections (possible cycle involving {} {} R)",
                    r.num,
                    r.gen
                );
                return Value::Null;
            }
            sanity -= 1;

            let Some(repr) = r.doc.upgrade() else {
                log::warn!("indirect reference {} {} R outlived its document", r.num, r.gen);
                return Value::Null;
            };

            match Document::from_repr(repr).load_object(r.num, r.gen) {
                Ok(next) => current = next,
                Err(_) => {
                    log::warn!("cannot load object ({} {} R) into cache", r.num, r.gen);
                    return Value::Null;
                }
            }
        }

        current
    }

    pub fn is_null(&self) -> bool {
        matches!(self.resolve(), Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.resolve(), Value::Bool(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self.resolve(), Value::Int(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self.resolve(), Value::Real(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.resolve(), Value::Int(_) | Value::Real(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self.resolve(), Value::String(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self.resolve(), Value::Name(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.resolve(), Value::Array(_))
    }

    pub fn is_dict(&self) -> bool {
        matches!(self.resolve(), Value::Dict(_))
    }

    /// The boolean payload, or `false` on any other tag.
    pub fn as_bool(&self) -> bool {
        match self.resolve() {
            Value::Bool(b) => b,
            _ => false,
        }
    }

    /// The integer payload; reals truncate, other tags yield 0.
    pub fn as_int(&self) -> i32 {
        match self.resolve() {
            Value::Int(i) => i,
            Value::Real(r) => r as i32,
            _ => 0,
        }
    }

    /// The numeric payload as a float; other tags yield 0.
    pub fn as_real(&self) -> f32 {
        match self.resolve() {
            Value::Real(r) => r,
            Value::Int(i) => i as f32,
            _ => 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.as_real() as f64
    }

    /// The name payload, or the empty name on any other tag.
    pub fn as_name(&self) -> Name {
        match self.resolve() {
            Value::Name(n) => n,
            _ => Name::empty(),
        }
    }

    /// The string payload, or the empty string on any other tag.
    pub fn as_string(&self) -> PdfString {
        match self.resolve() {
            Value::String(s) => s,
            _ => PdfString::empty(),
        }
    }

    /// The array payload, if this (after resolution) is an array.
    pub fn as_array(&self) -> Option<Array> {
        match self.resolve() {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The dictionary payload, if this (after resolution) is a dictionary.
    pub fn as_dict(&self) -> Option<Dict> {
        match self.resolve() {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// The raw reference, if this is one.
    pub fn as_ref_value(&self) -> Option<ObjRef> {
        match self {
            Value::Ref(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// Deep structural equality.
    ///
    /// Strings compare length-first then bytewise, names bytewise, arrays
    /// and dictionaries element-wise; references compare by number pair.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Int(a), Value::Real(b)) | (Value::Real(b), Value::Int(a)) => {
                *a as f32 == *b
            }
            (Value::String(a), Value::String(b)) => a.len() == b.len() && **a == **b,
            (Value::Name(a), Value::Name(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                (0..a.len()).all(|i| a.get_raw(i).deep_eq(&b.get_raw(i)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                a.keys().into_iter().all(|k| {
                    let (Some(va), Some(vb)) = (a.get_raw(&k), b.get_raw(&k)) else {
                        return false;
                    };
                    va.deep_eq(&vb)
                })
            }
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v)
    }
}

impl From<Name> for Value {
    fn from(v: Name) -> Self {
        Value::Name(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_typed_zeros() {
        let v = Value::Bool(true);
        assert_eq!(v.as_int(), 0);
        assert_eq!(v.as_real(), 0.0);
        assert!(v.as_name().is_empty());
        assert!(v.as_string().is_empty());
        assert!(v.as_array().is_none());
        assert!(v.as_dict().is_none());
        assert!(v.as_bool());
    }

    #[test]
    fn real_truncates_to_int() {
        assert_eq!(Value::Real(3.9).as_int(), 3);
        assert_eq!(Value::Int(7).as_real(), 7.0);
    }

    #[test]
    fn resolve_of_plain_value_is_identity() {
        let v = Value::Int(5);
        assert!(v.resolve().deep_eq(&v));
        assert!(v.resolve().resolve().deep_eq(&v));
    }

    #[test]
    fn deep_eq_compares_structures() {
        let a = Array::new(2);
        a.push(Value::Int(1));
        a.push(Value::String(PdfString::new(b"x".to_vec())));

        let b = Array::new(2);
        b.push(Value::Int(1));
        b.push(Value::String(PdfString::new(b"x".to_vec())));

        assert!(Value::Array(a.clone()).deep_eq(&Value::Array(b.clone())));

        b.push(Value::Null);
        assert!(!Value::Array(a).deep_eq(&Value::Array(b)));
    }

    #[test]
    fn values_are_shared_not_copied() {
        let a = Array::new(0);
        let d = Dict::new(1);
        d.put_key(b"Kids", Value::Array(a.clone()));

        a.push(Value::Int(1));

        // The dictionary sees the mutation because the array is shared.
        let kids = d.get(b"Kids").as_array().unwrap();
        assert_eq!(kids.len(), 1);
    }
}
