//! Array objects.

use crate::object::Value;
use std::fmt;
use std::sync::{Arc, RwLock};

/// An ordered sequence of values. Duplicates allowed.
///
/// Cloning shares the storage; mutation through any handle is visible to
/// all of them.
#[derive(Clone)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    /// Create an empty array with a capacity hint.
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(RwLock::new(Vec::with_capacity(capacity))))
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().unwrap().is_empty()
    }

    /// The element at `index`, resolved. Null when out of range.
    pub fn get(&self, index: usize) -> Value {
        self.get_raw(index).resolve()
    }

    /// The element at `index` without resolution. Null when out of range.
    pub fn get_raw(&self, index: usize) -> Value {
        self.0
            .read()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Replace the element at `index`. Ignored when out of range.
    pub fn put(&self, index: usize, value: Value) {
        let mut items = self.0.write().unwrap();

        if index < items.len() {
            items[index] = value;
        } else {
            log::warn!("array index {index} out of range (len {})", items.len());
        }
    }

    pub fn push(&self, value: Value) {
        self.0.write().unwrap().push(value);
    }

    /// A snapshot of the elements, unresolved.
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.read().unwrap().clone()
    }

    /// The elements resolved and converted to floats (zeros for non-numbers).
    pub fn to_floats(&self) -> Vec<f32> {
        self.snapshot().iter().map(|v| v.as_real()).collect()
    }

    /// The elements resolved and converted to integers.
    pub fn to_ints(&self) -> Vec<i32> {
        self.snapshot().iter().map(|v| v.as_int()).collect()
    }

    pub(crate) fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items = self.0.read().unwrap();
        f.debug_list().entries(items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let a = Array::new(4);
        a.push(Value::Int(1));
        a.push(Value::Int(2));
        a.put(0, Value::Int(9));

        assert_eq!(a.get(0).as_int(), 9);
        assert_eq!(a.get(1).as_int(), 2);
        assert!(matches!(a.get(5), Value::Null));
    }

    #[test]
    fn out_of_range_put_is_ignored() {
        let a = Array::new(0);
        a.put(3, Value::Int(1));
        assert_eq!(a.len(), 0);
    }

    #[test]
    fn float_conversion() {
        let a = Array::from_vec(vec![Value::Int(1), Value::Real(2.5), Value::Null]);
        assert_eq!(a.to_floats(), vec![1.0, 2.5, 0.0]);
    }
}
