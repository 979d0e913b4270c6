//! JSON merge patch with deterministic key order.
//!
//! Objects produced here always list `name` first and every other key in
//! ascending byte order, at every nesting level. Output is indented with one
//! tab per level so repeated retrievals of unchanged data are byte-identical.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::RetrieveError;

const NAME_KEY: &str = "name";

/// Applies `incoming` as a merge patch on top of `existing`.
///
/// Both documents must be JSON objects. Fields in `incoming` overwrite those in
/// `existing`, nested objects are merged recursively, and a `null` in
/// `incoming` removes the field.
pub fn merge(existing: &[u8], incoming: &[u8]) -> Result<Vec<u8>, RetrieveError> {
    let target = parse_object(existing, "existing")?;
    let patch = parse_object(incoming, "incoming")?;
    to_tab_indented(&merge_values(&target, &patch))
}

pub fn merge_values(target: &Value, patch: &Value) -> Value {
    let Value::Object(patch_map) = patch else {
        return canonicalize(patch);
    };
    let empty = Map::new();
    let target_map = match target {
        Value::Object(map) => map,
        _ => &empty,
    };

    let mut merged = Map::with_capacity(target_map.len() + patch_map.len());
    for key in ordered_keys(target_map.keys().chain(patch_map.keys())) {
        let value = match (target_map.get(key), patch_map.get(key)) {
            (_, Some(Value::Null)) => continue,
            (Some(current), Some(update)) => merge_values(current, update),
            // Patch-only subtrees still go through the merge so nested nulls vanish.
            (None, Some(update)) => merge_values(&Value::Null, update),
            (Some(current), None) => canonicalize(current),
            (None, None) => continue,
        };
        merged.insert(key.clone(), value);
    }
    Value::Object(merged)
}

pub fn to_tab_indented(value: &Value) -> Result<Vec<u8>, RetrieveError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value
        .serialize(&mut serializer)
        .map_err(|err| RetrieveError::Merge(err.to_string()))?;
    Ok(out)
}

fn parse_object(bytes: &[u8], side: &str) -> Result<Value, RetrieveError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| RetrieveError::Merge(format!("{side} document is not valid JSON: {err}")))?;
    if !value.is_object() {
        return Err(RetrieveError::Merge(format!(
            "{side} document is not a JSON object"
        )));
    }
    Ok(value)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            ordered_keys(map.keys())
                .into_iter()
                .map(|key| (key.clone(), canonicalize(&map[key])))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn ordered_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut keys: Vec<&String> = keys.collect();
    keys.sort_by(|a, b| key_order(a, b));
    keys.dedup();
    keys
}

fn key_order(a: &str, b: &str) -> Ordering {
    match (a == NAME_KEY, b == NAME_KEY) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_sorts_before_everything() {
        let mut keys = vec!["zeta", "name", "Alpha", "id", "_private"];
        keys.sort_by(|a, b| key_order(a, b));
        assert_eq!(keys, vec!["name", "Alpha", "_private", "id", "zeta"]);
    }

    #[test]
    fn canonicalize_reaches_objects_inside_arrays() {
        let value = canonicalize(&json!({"list": [{"b": 1, "name": "x", "a": 2}]}));
        let keys: Vec<&String> = value["list"][0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "a", "b"]);
    }

    #[test]
    fn patch_only_subtree_drops_nested_nulls() {
        let merged = merge_values(&json!({}), &json!({"a": {"b": null, "c": 1}}));
        assert_eq!(merged, json!({"a": {"c": 1}}));
    }
}
