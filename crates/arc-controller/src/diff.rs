//! Desired vs. observed child sets.

use std::collections::BTreeMap;

/// What to do with each child of a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDiff<K> {
    /// Desired but not yet tracked.
    pub to_create: Vec<K>,
    /// Tracked but no longer desired.
    pub to_delete: Vec<K>,
    /// Desired and tracked; their status may need refreshing.
    pub to_check: Vec<K>,
}

impl<K> ChildDiff<K> {
    /// Returns true if nothing has to be created or deleted.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Splits child keys into create, delete and check sets.
///
/// Every output is in ascending key order.
#[must_use]
pub fn diff_children<K, D, O>(desired: &BTreeMap<K, D>, observed: &BTreeMap<K, O>) -> ChildDiff<K>
where
    K: Ord + Clone,
{
    let (to_check, to_create): (Vec<K>, Vec<K>) = desired
        .keys()
        .cloned()
        .partition(|key| observed.contains_key(key));
    let to_delete = observed
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .cloned()
        .collect();

    ChildDiff {
        to_create,
        to_delete,
        to_check,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(keys: &[&str]) -> BTreeMap<String, ()> {
        keys.iter().map(|k| ((*k).to_string(), ())).collect()
    }

    #[test]
    fn splits_into_three_sorted_sets() {
        let desired = map(&["c", "a", "b"]);
        let observed = map(&["d", "b", "a0"]);
        let diff = diff_children(&desired, &observed);

        assert_eq!(diff.to_create, vec!["a", "c"]);
        assert_eq!(diff.to_delete, vec!["a0", "d"]);
        assert_eq!(diff.to_check, vec!["b"]);
        assert!(!diff.is_converged());
    }

    #[test]
    fn identical_sets_are_converged() {
        let keys = map(&["x", "y"]);
        let diff = diff_children(&keys, &keys);
        assert!(diff.is_converged());
        assert_eq!(diff.to_check, vec!["x", "y"]);
    }

    #[test]
    fn empty_desired_deletes_everything() {
        let diff = diff_children(&map(&[]), &map(&["a", "b"]));
        assert!(diff.to_create.is_empty());
        assert_eq!(diff.to_delete, vec!["a", "b"]);
    }
}
