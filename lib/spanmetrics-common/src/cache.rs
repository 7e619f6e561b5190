//! A bounded, least-recently-used cache with deferred reclamation of evicted entries.

use std::{hash::Hash, num::NonZeroUsize};

use crate::{collections::FastIndexMap, error::GenericError, generic_error, hash::FastBuildHasher};

/// A fixed-capacity cache with least-recently-used eviction.
///
/// Live entries are held in an [`lru::LruCache`], which keeps strict recency order with O(1) lookups, insertions, and
/// evictions.
///
/// ## Deferred reclamation
///
/// Inserting past capacity does not drop the least-recently-used entry outright. Instead, it moves into a
/// pending-eviction queue, where it stays until [`reclaim_evicted`][Self::reclaim_evicted] or [`purge`][Self::purge]
/// is called. A pending entry is invisible to iteration and to [`peek`][Self::peek], but a call to
/// [`get`][Self::get] revives it back into the live set. Callers holding state that depends on cache membership use
/// the entries returned by `reclaim_evicted` to drop that state at a point of their choosing.
pub struct LruCache<K, V> {
    live: lru::LruCache<K, V, FastBuildHasher>,
    evicted: FastIndexMap<K, V>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates a new `LruCache` holding at most `capacity` live entries.
    ///
    /// # Errors
    ///
    /// If `capacity` is zero, an error is returned.
    pub fn new(capacity: usize) -> Result<Self, GenericError> {
        let capacity =
            NonZeroUsize::new(capacity).ok_or_else(|| generic_error!("cache capacity must be greater than zero"))?;

        Ok(Self {
            live: lru::LruCache::with_hasher(capacity, FastBuildHasher::default()),
            evicted: FastIndexMap::default(),
        })
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Returns the number of evicted entries waiting to be reclaimed.
    pub fn pending_evictions(&self) -> usize {
        self.evicted.len()
    }

    /// Returns a reference to the value for `key`, marking it as most recently used.
    ///
    /// If `key` was evicted but not yet reclaimed, it is revived into the live set, which may in turn evict the
    /// current least-recently-used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|value| &*value)
    }

    /// Returns a mutable reference to the value for `key`, marking it as most recently used.
    ///
    /// Follows the same revival rules as [`get`][Self::get].
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if !self.live.contains(key) {
            // Keep the queue in eviction order for `reclaim_evicted`.
            let (key, value) = self.evicted.shift_remove_entry(key)?;
            self.push(key, value);
        }

        self.live.get_mut(key)
    }

    /// Returns a reference to the value for `key` without updating recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.live.peek(key)
    }

    /// Inserts a value, overwriting any existing value for the same key, and marks it as most recently used.
    ///
    /// If the cache is over capacity afterwards, the least-recently-used entry is moved to the pending-eviction queue.
    /// Any pending-eviction entry for the same key is discarded in favor of the new value.
    pub fn insert(&mut self, key: K, value: V) {
        self.evicted.shift_remove(&key);
        self.push(key, value);
    }

    /// Visits every live entry, in no particular order.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in self.live.iter() {
            visitor(key, value);
        }
    }

    /// Returns an iterator over every live entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.live.iter()
    }

    /// Returns an iterator over every live entry with mutable access to values, in no particular order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.live.iter_mut()
    }

    /// Removes every entry, both live and pending eviction.
    pub fn purge(&mut self) {
        self.live.clear();
        self.evicted.clear();
    }

    /// Flushes the pending-eviction queue, returning the removed entries in the order they were evicted.
    pub fn reclaim_evicted(&mut self) -> Vec<(K, V)> {
        self.evicted.drain(..).collect()
    }

    fn push(&mut self, key: K, value: V) {
        // `push` hands back either the replaced entry for the same key, which stays live, or the evicted LRU entry.
        if let Some((key, value)) = self.live.push(key, value) {
            if !self.live.contains(&key) {
                self.evicted.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use proptest::prelude::*;

    use super::*;

    fn live_keys<V>(cache: &LruCache<u8, V>) -> Vec<u8> {
        let mut keys = cache.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(LruCache::<u8, u8>::new(0).is_err());
        assert!(LruCache::<u8, u8>::new(1).is_ok());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.pending_evictions(), 1);
        assert_eq!(live_keys(&cache), vec![2, 3]);
        assert_eq!(cache.peek(&1), None);
        assert_eq!(cache.reclaim_evicted(), vec![(1, "a")]);
        assert_eq!(cache.pending_evictions(), 0);
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = LruCache::new(2).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), Some(&"a"));
        cache.insert(3, "c");

        assert_eq!(live_keys(&cache), vec![1, 3]);
        assert_eq!(cache.reclaim_evicted(), vec![(2, "b")]);
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let mut cache = LruCache::new(2).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.peek(&1), Some(&"a"));
        cache.insert(3, "c");

        assert_eq!(live_keys(&cache), vec![2, 3]);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = LruCache::new(2).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(1, "z");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(cache.peek(&1), Some(&"z"));
    }

    #[test]
    fn get_revives_pending_eviction() {
        let mut cache = LruCache::new(2).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");

        // Reviving 1 pushes out 2, the least recently used live entry.
        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(live_keys(&cache), vec![1, 3]);
        assert_eq!(cache.reclaim_evicted(), vec![(2, "b")]);
    }

    #[test]
    fn insert_supersedes_pending_eviction() {
        let mut cache = LruCache::new(1).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(1, "c");

        assert_eq!(cache.peek(&1), Some(&"c"));
        assert_eq!(cache.reclaim_evicted(), vec![(2, "b")]);
    }

    #[test]
    fn purge_clears_live_and_pending() {
        let mut cache = LruCache::new(1).unwrap();
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.purge();

        assert!(cache.is_empty());
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(cache.get(&1), None);
        assert!(cache.reclaim_evicted().is_empty());
    }

    #[test]
    fn iter_mut_updates_values() {
        let mut cache = LruCache::new(4).unwrap();
        cache.insert(1, 10);
        cache.insert(2, 20);
        for (_, value) in cache.iter_mut() {
            *value += 1;
        }

        let mut total = 0;
        cache.for_each(|_, value| total += *value);
        assert_eq!(total, 32);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u8, u32),
        Get(u8),
        Peek(u8),
        Reclaim,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            (0u8..12).prop_map(Op::Get),
            (0u8..12).prop_map(Op::Peek),
            Just(Op::Reclaim),
        ]
    }

    // Straightforward reference model: live entries ordered most recently used first.
    struct Model {
        capacity: usize,
        live: VecDeque<(u8, u32)>,
        evicted: Vec<(u8, u32)>,
    }

    impl Model {
        fn insert_new(&mut self, key: u8, value: u32) {
            self.live.push_front((key, value));
            if self.live.len() > self.capacity {
                let lru = self.live.pop_back().unwrap();
                self.evicted.push(lru);
            }
        }

        fn insert(&mut self, key: u8, value: u32) {
            if let Some(pos) = self.live.iter().position(|(k, _)| *k == key) {
                self.live.remove(pos);
                self.live.push_front((key, value));
            } else {
                self.evicted.retain(|(k, _)| *k != key);
                self.insert_new(key, value);
            }
        }

        fn get(&mut self, key: u8) -> Option<u32> {
            if let Some(pos) = self.live.iter().position(|(k, _)| *k == key) {
                let entry = self.live.remove(pos).unwrap();
                self.live.push_front(entry);
                return Some(entry.1);
            }

            let pos = self.evicted.iter().position(|(k, _)| *k == key)?;
            let (key, value) = self.evicted.remove(pos);
            self.insert_new(key, value);
            Some(value)
        }

        fn peek(&self, key: u8) -> Option<u32> {
            self.live.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
        }
    }

    proptest! {
        #[test]
        fn matches_reference_model(capacity in 1usize..6, ops in proptest::collection::vec(arb_op(), 0..64)) {
            let mut cache = LruCache::new(capacity).unwrap();
            let mut model = Model { capacity, live: VecDeque::new(), evicted: Vec::new() };

            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        cache.insert(k, v);
                        model.insert(k, v);
                    }
                    Op::Get(k) => prop_assert_eq!(cache.get(&k).copied(), model.get(k)),
                    Op::Peek(k) => prop_assert_eq!(cache.peek(&k).copied(), model.peek(k)),
                    Op::Reclaim => {
                        let reclaimed = cache.reclaim_evicted();
                        let expected = std::mem::take(&mut model.evicted);
                        prop_assert_eq!(reclaimed, expected);
                    }
                }

                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.len(), model.live.len());
                prop_assert_eq!(cache.pending_evictions(), model.evicted.len());

                let mut expected_keys = model.live.iter().map(|(k, _)| *k).collect::<Vec<_>>();
                expected_keys.sort_unstable();
                prop_assert_eq!(live_keys(&cache), expected_keys);
            }
        }
    }
}
