//! Merge-patch diffing for record history.
//!
//! History entries store *backward* patches: applying `history[0].patch`
//! to the current `entry` reproduces the previous `entry`. The diff is
//! structural recursion on objects; arrays are atomic and replaced whole;
//! a `null` patch value deletes the key, so values that are themselves
//! `null` cannot be restored (the usual merge-patch limitation).

use serde_json::{Map, Value};

/// Computes the backward merge-patch between two values.
///
/// Applying the returned patch to `new` yields `old`. For two objects the
/// patch records, per key: the old value where `new` dropped or changed
/// it (recursing where both sides are objects), and `null` where `new`
/// introduced it. Non-object inputs produce a whole-value replacement.
#[must_use]
pub fn diff(new: &Value, old: &Value) -> Value {
    let (Some(new_map), Some(old_map)) = (new.as_object(), old.as_object()) else {
        return if new == old {
            Value::Object(Map::new())
        } else {
            old.clone()
        };
    };

    let mut patch = Map::new();
    for (key, old_value) in old_map {
        match new_map.get(key) {
            None => {
                patch.insert(key.clone(), old_value.clone());
            }
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                if new_value.is_object() && old_value.is_object() {
                    patch.insert(key.clone(), diff(new_value, old_value));
                } else {
                    patch.insert(key.clone(), old_value.clone());
                }
            }
        }
    }
    for key in new_map.keys() {
        if !old_map.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    Value::Object(patch)
}

/// Applies a merge-patch to `target`, returning the patched value.
///
/// Standard semantics: a non-object patch replaces the target outright;
/// within objects, `null` deletes the key, nested objects recurse, and
/// anything else replaces the member.
#[must_use]
pub fn apply(target: &Value, patch: &Value) -> Value {
    let Some(patch_map) = patch.as_object() else {
        return patch.clone();
    };

    let mut result = target.as_object().cloned().unwrap_or_default();
    for (key, patch_value) in patch_map {
        if patch_value.is_null() {
            result.remove(key);
        } else if patch_value.is_object() {
            let base = result.get(key).cloned().unwrap_or(Value::Object(Map::new()));
            result.insert(key.clone(), apply(&base, patch_value));
        } else {
            result.insert(key.clone(), patch_value.clone());
        }
    }
    Value::Object(result)
}

/// Returns `true` if the patch carries no changes.
#[must_use]
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// Collects the dotted paths of leaves that differ between `old` and
/// `new`, rooted at `prefix`.
///
/// Paths follow the iteration order of `new`'s keys with depth-first
/// descent into sub-objects present on both sides; keys only `old` has
/// (deletions) are appended per level. Arrays are atomic, so an array
/// difference contributes the path of the array itself.
pub(crate) fn changed_paths(prefix: &str, new: &Value, old: &Value, out: &mut Vec<String>) {
    let (Some(new_map), Some(old_map)) = (new.as_object(), old.as_object()) else {
        if new != old {
            out.push(prefix.to_string());
        }
        return;
    };

    for (key, new_value) in new_map {
        let path = format!("{prefix}.{key}");
        match old_map.get(key) {
            None => out.push(path),
            Some(old_value) if new_value == old_value => {}
            Some(old_value) => {
                if new_value.is_object() && old_value.is_object() {
                    changed_paths(&path, new_value, old_value, out);
                } else {
                    out.push(path);
                }
            }
        }
    }
    for key in old_map.keys() {
        if !new_map.contains_key(key) {
            out.push(format!("{prefix}.{key}"));
        }
    }
}
