//! Concurrency-safe generic map.
//!
//! One mutex guards the whole table; every operation takes the lock for a
//! short critical section, and `keys`/`values`/`snapshot` copy under it, so
//! a returned copy never observes later mutation. A single instance stores
//! exactly one key type and one value type for its lifetime, fixed by the
//! type parameters.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

/// A mutex-protected map, safe to share across threads and tasks.
///
/// All methods take `&self`; share an instance with `Arc` and call freely
/// from any number of workers. Reads hand back copies, never references into
/// the table.
pub struct ConcurrentMap<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> ConcurrentMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The declared key type.
    pub fn key_type(&self) -> TypeId
    where
        K: 'static,
    {
        TypeId::of::<K>()
    }

    /// The declared value type.
    pub fn value_type(&self) -> TypeId
    where
        V: 'static,
    {
        TypeId::of::<V>()
    }

    pub fn key_type_name(&self) -> &'static str {
        type_name::<K>()
    }

    pub fn value_type_name(&self) -> &'static str {
        type_name::<V>()
    }
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    /// Look up a key, returning a copy of the stored value.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Insert or overwrite. Returns the previous value if one existed.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.entries.lock().unwrap().insert(key, value)
    }

    /// Insert only if no entry exists for `key`, as one atomic step.
    ///
    /// Returns `true` if the value landed, `false` if the key was already
    /// present (the map unchanged). Check-then-insert as two separate calls
    /// is racy under concurrent writers; this is the safe form.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Delete a key, returning what was stored.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().unwrap().remove(key)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Point-in-time copy of all keys, in no particular order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    /// Point-in-time copy of all values, in no particular order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Point-in-time copy of the whole table.
    pub fn snapshot(&self) -> HashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.entries.lock().unwrap().clone()
    }
}

impl<K, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ConcurrentMap<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConcurrentMap<{}, {}> ",
            type_name::<K>(),
            type_name::<V>()
        )?;
        let entries = self.entries.lock().unwrap();
        f.debug_map().entries(entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let map: ConcurrentMap<i64, f64> = ConcurrentMap::new();
        assert_eq!(map.insert(3, 0.3), None);
        assert_eq!(map.get(&3), Some(0.3));
        assert_eq!(map.insert(3, 3.3), Some(0.3));
        assert_eq!(map.remove(&3), Some(3.3));
        assert_eq!(map.remove(&3), None);
        assert_eq!(map.get(&3), None);
    }

    #[test]
    fn insert_if_absent_rejects_existing_key() {
        let map: ConcurrentMap<String, i64> = ConcurrentMap::new();
        assert!(map.insert_if_absent("a".to_string(), 1));
        assert!(!map.insert_if_absent("a".to_string(), 2));
        assert_eq!(map.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn len_contains_clear() {
        let map: ConcurrentMap<i64, bool> = ConcurrentMap::new();
        assert!(map.is_empty());
        for k in 0..4 {
            map.insert(k, k % 2 == 0);
        }
        assert_eq!(map.len(), 4);
        assert!(map.contains_key(&2));
        assert!(!map.contains_key(&9));
        map.clear();
        assert!(map.is_empty());
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn exports_are_point_in_time_copies() {
        let map: ConcurrentMap<i64, i64> = ConcurrentMap::new();
        map.insert(1, 10);
        map.insert(2, 20);

        let keys = map.keys();
        let values = map.values();
        let snapshot = map.snapshot();

        map.insert(3, 30);
        map.remove(&1);

        assert_eq!(keys.len(), 2);
        assert_eq!(values.len(), 2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&1), Some(&10));
    }

    #[test]
    fn declared_types_are_exposed() {
        let map: ConcurrentMap<i64, bool> = ConcurrentMap::new();
        assert_eq!(map.key_type(), TypeId::of::<i64>());
        assert_eq!(map.value_type(), TypeId::of::<bool>());
        assert_eq!(map.key_type_name(), "i64");
        assert_eq!(map.value_type_name(), "bool");
    }

    #[test]
    fn debug_render_names_the_declared_types() {
        let map: ConcurrentMap<i64, bool> = ConcurrentMap::new();
        map.insert(1, true);
        let rendered = format!("{map:?}");
        assert!(rendered.starts_with("ConcurrentMap<i64, bool>"));
        assert!(rendered.contains("1: true"));
    }
}
