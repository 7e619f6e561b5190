//! Hash-based collections using [`FastBuildHasher`][crate::hash::FastBuildHasher].

use crate::hash::FastBuildHasher;

/// A hash set based on `hashbrown` ([`HashSet`][hashbrown::HashSet]) using
/// [`FastBuildHasher`][crate::hash::FastBuildHasher].
pub type FastHashSet<T> = hashbrown::HashSet<T, FastBuildHasher>;

/// A hash map with stable insertion order based on `indexmap` ([`IndexMap`][indexmap::IndexMap]) using
/// [`FastBuildHasher`][crate::hash::FastBuildHasher].
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, FastBuildHasher>;
