//! Attribute maps and the diff rules used to keep attribute caches current
//!
//! Attribute changes travel as diffs: a key mapped to a non-null value sets or
//! replaces that attribute, a key mapped to [`Variant::Null`] removes it.

use std::collections::HashMap;

use crate::Variant;

/// Attribute name to value mapping
pub type Attributes = HashMap<String, Variant>;

/// Merge `change` into `target` and return the changes that were really made.
///
/// Keys whose value is already present with the same content do not show up
/// in the returned diff, so applying the same change twice yields an empty diff
/// the second time.
pub fn merge(target: &mut Attributes, change: &Attributes) -> Attributes {
    let mut diff = Attributes::new();

    for (key, value) in change {
        if value.is_null() {
            if target.remove(key).is_some() {
                diff.insert(key.clone(), Variant::Null);
            }
            continue;
        }

        if target.get(key) != Some(value) {
            diff.insert(key.clone(), value.clone());
            target.insert(key.clone(), value.clone());
        }
    }

    diff
}

/// Merge a diff that may be flagged initial.
///
/// An initial diff carries the complete attribute set, so the target is
/// cleared before merging.
pub fn merge_initial(target: &mut Attributes, diff: &Attributes, initial: bool) {
    if initial {
        target.clear();
    }
    merge(target, diff);
}

/// Replace the content of `target` with `attributes` and return the diff.
///
/// Attributes missing from `attributes` are reported as removed.
pub fn set(target: &mut Attributes, attributes: &Attributes) -> Attributes {
    let mut diff = Attributes::new();

    let stale: Vec<String> = target
        .keys()
        .filter(|key| !attributes.contains_key(*key))
        .cloned()
        .collect();

    for key in stale {
        target.remove(&key);
        diff.insert(key, Variant::Null);
    }

    diff.extend(merge(target, attributes));
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, Variant)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_sets_and_removes() {
        let mut target = attrs(&[("unit", "C".into()), ("error", true.into())]);
        let diff = merge(
            &mut target,
            &attrs(&[("unit", "K".into()), ("error", Variant::Null), ("low", 1.into())]),
        );

        assert_eq!(target, attrs(&[("unit", "K".into()), ("low", 1.into())]));
        assert_eq!(
            diff,
            attrs(&[("unit", "K".into()), ("error", Variant::Null), ("low", 1.into())])
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let change = attrs(&[("unit", "C".into()), ("gone", Variant::Null)]);
        let mut target = attrs(&[("gone", 1.into())]);

        let first = merge(&mut target, &change);
        let after_first = target.clone();
        let second = merge(&mut target, &change);

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(target, after_first);
    }

    #[test]
    fn test_removing_missing_key_is_not_a_change() {
        let mut target = Attributes::new();
        let diff = merge(&mut target, &attrs(&[("missing", Variant::Null)]));
        assert!(diff.is_empty());
        assert!(target.is_empty());
    }

    #[test]
    fn test_merge_initial_clears_first() {
        let mut target = attrs(&[("old", 1.into())]);
        merge_initial(&mut target, &attrs(&[("new", 2.into())]), true);
        assert_eq!(target, attrs(&[("new", 2.into())]));

        merge_initial(&mut target, &attrs(&[("more", 3.into())]), false);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_set_replaces_whole_map() {
        let mut target = attrs(&[("a", 1.into()), ("b", 2.into())]);
        let diff = set(&mut target, &attrs(&[("b", 2.into()), ("c", 3.into())]));

        assert_eq!(target, attrs(&[("b", 2.into()), ("c", 3.into())]));
        assert_eq!(diff, attrs(&[("a", Variant::Null), ("c", 3.into())]));
    }
}
