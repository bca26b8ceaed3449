use std::collections::HashMap;
use std::mem;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The minimum number of deleted slots before the order log is compacted.
///
/// Below this, compaction would cost more than the wasted slots.
const COMPACTION_MIN_TOMBSTONES: usize = 64;

/// A thread-safe key value store that remembers the order keys were first inserted in.
///
/// Re-setting an existing key replaces its value but keeps its position. Deleting a key forgets
/// its position, so setting it again appends it to the end.
///
/// Writers (`set`, `delete`) are exclusive; readers (`get`, `snapshot`) run in parallel with each
/// other and never observe a half-applied write.
///
/// ```
/// use cq::OrderedStore;
///
/// let store = OrderedStore::new();
/// store.set("k1", "v1");
/// store.set("k2", "v2");
/// store.set("k1", "v3");
///
/// let (keys, values) = store.snapshot();
/// assert_eq!(keys, vec!["k1", "k2"]);
/// assert_eq!(values, vec!["v3", "v2"]);
/// ```
#[derive(Debug, Default)]
pub struct OrderedStore {
    inner: RwLock<Inner>,
}

/// The order log and its index.
///
/// `order` holds keys in insertion order, with `None` marking deleted slots. Every key in `index`
/// sits at `order[entry.position]`, and every `Some` slot in `order` has an `index` entry.
#[derive(Debug, Default)]
struct Inner {
    order: Vec<Option<String>>,
    index: HashMap<String, IndexEntry>,
    tombstones: usize,
}

#[derive(Debug)]
struct IndexEntry {
    position: usize,
    value: String,
}

impl OrderedStore {
    /// Construct a new, empty store.
    pub fn new() -> OrderedStore {
        OrderedStore::default()
    }

    /// Set `key` to `value`.
    ///
    /// A new key goes to the end of the order. An existing key keeps its position.
    pub fn set<K: Into<String>, V: Into<String>>(&self, key: K, value: V) {
        let (key, value) = (key.into(), value.into());
        let mut inner = self.write();

        if let Some(entry) = inner.index.get_mut(&key) {
            entry.value = value;
            return;
        }

        let position = inner.order.len();
        inner.order.push(Some(key.clone()));
        inner.index.insert(key, IndexEntry { position, value });
    }

    /// Get the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read().index.get(key).map(|entry| entry.value.clone())
    }

    /// Remove `key` (and its value). Removing an absent key does nothing.
    pub fn delete(&self, key: &str) {
        let mut inner = self.write();

        let entry = match inner.index.remove(key) {
            Some(entry) => entry,
            None => return,
        };
        inner.order[entry.position] = None;
        inner.tombstones += 1;

        let tombstones = inner.tombstones;
        if tombstones >= COMPACTION_MIN_TOMBSTONES && tombstones * 2 > inner.order.len() {
            inner.compact();
        }
    }

    /// Take a consistent copy of every key and value, in store order.
    ///
    /// The returned vectors are index-aligned: `values[i]` is the value of `keys[i]`.
    pub fn snapshot(&self) -> (Vec<String>, Vec<String>) {
        let inner = self.read();
        let mut keys = Vec::with_capacity(inner.index.len());
        let mut values = Vec::with_capacity(inner.index.len());

        for key in inner.order.iter().flatten() {
            if let Some(entry) = inner.index.get(key) {
                keys.push(key.clone());
                values.push(entry.value.clone());
            }
        }
        (keys, values)
    }

    /// The number of keys in the store.
    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Mutations can't panic part way through, so a poisoned lock still guards a sound `Inner`.
    fn read(&self) -> RwLockReadGuard<Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// Drop deleted slots from the order log and re-point the index at the new positions.
    fn compact(&mut self) {
        let order = mem::replace(&mut self.order, Vec::with_capacity(self.index.len()));
        for key in order.into_iter().flatten() {
            if let Some(entry) = self.index.get_mut(&key) {
                entry.position = self.order.len();
            }
            self.order.push(Some(key));
        }
        self.tombstones = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reinsert_keeps_position() {
        let store = OrderedStore::new();
        store.set("k1", "v1");
        store.set("k2", "v2");
        store.set("k1", "v3");

        let (keys, values) = store.snapshot();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(values, vec!["v3", "v2"]);
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let store = OrderedStore::new();
        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".to_owned()));

        store.delete("k");
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_absent_key_is_noop() {
        let store = OrderedStore::new();
        store.set("a", "1");
        store.set("b", "2");
        let before = store.snapshot();

        store.delete("missing");
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn reinsert_after_delete_appends() {
        let store = OrderedStore::new();
        store.set("a", "1");
        store.set("b", "2");
        store.delete("a");
        store.set("a", "3");

        let (keys, values) = store.snapshot();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(values, vec!["2", "3"]);
    }

    #[test]
    fn order_survives_compaction() {
        let store = OrderedStore::new();
        for i in 0..1000 {
            store.set(format!("k{}", i), format!("v{}", i));
        }
        for i in (0..1000).filter(|i| i % 4 != 0) {
            store.delete(&format!("k{}", i));
        }
        store.set("k0", "updated");
        store.set("late", "x");

        let (keys, values) = store.snapshot();
        let mut expected: Vec<String> = (0..1000).step_by(4).map(|i| format!("k{}", i)).collect();
        expected.push("late".to_owned());
        assert_eq!(keys, expected);
        assert_eq!(values[0], "updated");
        assert_eq!(values[1], "v4");
        assert_eq!(store.len(), 251);

        let inner = store.read();
        assert!(inner.order.len() < 1000);
        for (key, entry) in &inner.index {
            assert_eq!(inner.order[entry.position].as_deref(), Some(key.as_str()));
        }
    }

    #[test]
    fn concurrent_sets_are_all_visible() {
        let store = Arc::new(OrderedStore::new());
        let handles: Vec<_> = (0..1000)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.set(format!("key{}", i), format!("value{}", i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (keys, values) = store.snapshot();
        assert_eq!(keys.len(), 1000);
        assert_eq!(values.len(), 1000);
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(key.replace("key", "value"), *value);
        }
    }

    #[test]
    fn snapshots_are_never_torn() {
        let store = Arc::new(OrderedStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2000 {
                    store.set(format!("key{}", i % 100), format!("value{}", i % 100));
                    if i % 3 == 0 {
                        store.delete(&format!("key{}", (i + 50) % 100));
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let (keys, values) = store.snapshot();
                        assert_eq!(keys.len(), values.len());
                        for (key, value) in keys.iter().zip(&values) {
                            assert_eq!(key.replace("key", "value"), *value);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
