//! The size-bounded interned store shared between context clones.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Key of a stored item: the owning generation together with a
/// caller-chosen identity (typically the object number).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub generation: i32,
    pub identity: u64,
}

impl StoreKey {
    pub fn new(generation: i32, identity: u64) -> Self {
        Self {
            generation,
            identity,
        }
    }
}

struct SlotRepr {
    data: Arc<[u8]>,
    tick: u64,
}

struct StoreRepr {
    slots: FxHashMap<StoreKey, SlotRepr>,
    used: usize,
    tick: u64,
}

/// A least-recently-used byte store with a fixed byte budget.
///
/// Shared between all clones of a context. When an insertion would exceed
/// the budget, the oldest entries are evicted first; an oversized item is
/// stored anyway so a single large stream cannot starve its own caching.
pub struct Store {
    inner: Mutex<StoreRepr>,
    budget: usize,
}

impl Store {
    /// Default store budget of 32 MiB.
    pub const DEFAULT_BUDGET: usize = 32 << 20;

    pub fn new(budget: usize) -> Self {
        Self {
            inner: Mutex::new(StoreRepr {
                slots: FxHashMap::default(),
                used: 0,
                tick: 0,
            }),
            budget,
        }
    }

    /// Fetch an item, refreshing its age.
    pub fn get(&self, key: StoreKey) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        let slot = inner.slots.get_mut(&key)?;
        slot.tick = tick;

        Some(slot.data.clone())
    }

    /// Insert an item, evicting old entries if the budget is exceeded.
    pub fn put(&self, key: StoreKey, data: Arc<[u8]>) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(old) = inner.slots.remove(&key) {
            inner.used -= old.data.len();
        }

        inner.used += data.len();
        inner.slots.insert(key, SlotRepr { data, tick });

        if inner.used > self.budget {
            let target = self.budget;
            scavenge_impl(&mut inner, target);
        }
    }

    /// Evict entries oldest-first until at most `target` bytes remain.
    pub fn scavenge(&self, target: usize) {
        let mut inner = self.inner.lock().unwrap();
        scavenge_impl(&mut inner, target);
    }

    /// Drop every entry belonging to the given generation.
    pub fn drop_generation(&self, generation: i32) {
        let mut inner = self.inner.lock().unwrap();

        let dead: Vec<StoreKey> = inner
            .slots
            .keys()
            .filter(|k| k.generation == generation)
            .copied()
            .collect();

        for key in dead {
            if let Some(slot) = inner.slots.remove(&key) {
                inner.used -= slot.data.len();
            }
        }
    }

    /// The number of bytes currently held.
    pub fn used(&self) -> usize {
        self.inner.lock().unwrap().used
    }
}

fn scavenge_impl(inner: &mut StoreRepr, target: usize) {
    while inner.used > target && !inner.slots.is_empty() {
        let oldest = inner
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.tick)
            .map(|(k, _)| *k);

        let Some(key) = oldest else {
            break;
        };

        if let Some(slot) = inner.slots.remove(&key) {
            inner.used -= slot.data.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Arc<[u8]> {
        vec![0u8; n].into()
    }

    #[test]
    fn get_refreshes_age() {
        let store = Store::new(100);
        store.put(StoreKey::new(0, 1), bytes(40));
        store.put(StoreKey::new(0, 2), bytes(40));
        // Touch 1 so that 2 becomes the eviction candidate.
        assert!(store.get(StoreKey::new(0, 1)).is_some());
        store.put(StoreKey::new(0, 3), bytes(40));

        assert!(store.get(StoreKey::new(0, 1)).is_some());
        assert!(store.get(StoreKey::new(0, 2)).is_none());
    }

    #[test]
    fn scavenge_frees_to_target() {
        let store = Store::new(1000);
        for i in 0..10 {
            store.put(StoreKey::new(0, i), bytes(100));
        }
        store.scavenge(300);
        assert!(store.used() <= 300);
    }

    #[test]
    fn drop_generation_removes_only_that_generation() {
        let store = Store::new(1000);
        store.put(StoreKey::new(1, 1), bytes(10));
        store.put(StoreKey::new(2, 1), bytes(10));
        store.drop_generation(1);
        assert!(store.get(StoreKey::new(1, 1)).is_none());
        assert!(store.get(StoreKey::new(2, 1)).is_some());
    }
}
