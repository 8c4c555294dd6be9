//! Hash collections used across Ember.
//!
//! Asset ids are already well distributed 128-bit values, so the registries use
//! AHash rather than SipHash.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

/// Type alias for a HashMap hashed with AHash.
pub type AHashMap<K, V> = ahash::AHashMap<K, V>;

/// Type alias for a HashSet hashed with AHash.
pub type AHashSet<T> = ahash::AHashSet<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert(7u128, "asset");
        assert_eq!(map.get(&7u128), Some(&"asset"));
        assert!(map.remove(&7u128).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn test_hashset_ahash() {
        let mut set = HashSet::new();
        assert!(set.insert((1u128, 0u32)));
        assert!(!set.insert((1u128, 0u32)));
        assert!(set.contains(&(1u128, 0u32)));
    }
}
