//! Equality join of two keyed collections.
//!
//! Each element of `a` is paired with the first not-yet-consumed element of
//! `b` carrying the same key, in `b`'s original order. Every element takes
//! part in at most one pair. Elements whose key extractor yields `None` never
//! match.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Result of [`merge_by_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged<A, B> {
    /// Matched pairs, in `a`'s original order.
    pub both: Vec<(A, B)>,

    /// Elements of `a` without a partner, in original order.
    pub only_a: Vec<A>,

    /// Elements of `b` never consumed, in original order.
    pub only_b: Vec<B>,
}

/// Join `a` and `b` on the keys produced by `key_a` and `key_b`.
pub fn merge_by_key<A, B, K, FA, FB>(a: Vec<A>, b: Vec<B>, key_a: FA, key_b: FB) -> Merged<A, B>
where
    K: Eq + Hash,
    FA: Fn(&A) -> Option<K>,
    FB: Fn(&B) -> Option<K>,
{
    // Key -> indices into `b` that are still available, oldest first.
    let mut index: HashMap<K, VecDeque<usize>> = HashMap::new();
    for (i, item) in b.iter().enumerate() {
        if let Some(key) = key_b(item) {
            index.entry(key).or_default().push_back(i);
        }
    }

    let mut slots: Vec<Option<B>> = b.into_iter().map(Some).collect();
    let mut both = Vec::new();
    let mut only_a = Vec::new();

    for item in a {
        let partner = key_a(&item)
            .and_then(|key| index.get_mut(&key))
            .and_then(|candidates| candidates.pop_front())
            .and_then(|i| slots[i].take());

        match partner {
            Some(partner) => both.push((item, partner)),
            None => only_a.push(item),
        }
    }

    let only_b = slots.into_iter().flatten().collect();

    Merged {
        both,
        only_a,
        only_b,
    }
}

/// Keys that occur more than once in `items`, in order of first repetition.
pub fn duplicate_keys<T, K, F>(items: &[T], key: F) -> Vec<K>
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> Option<K>,
{
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();

    for k in items.iter().filter_map(&key) {
        if !seen.insert(k.clone()) && reported.insert(k.clone()) {
            duplicates.push(k);
        }
    }

    duplicates
}
