use assert_matches::assert_matches;
use serde_json::{Value, json};

use meta_retrieve::error::RetrieveError;
use meta_retrieve::merge::merge;

fn merge_json(existing: Value, incoming: Value) -> Value {
    let merged = merge(
        existing.to_string().as_bytes(),
        incoming.to_string().as_bytes(),
    )
    .unwrap();
    serde_json::from_slice(&merged).unwrap()
}

fn key_order(value: &Value) -> Vec<String> {
    value.as_object().unwrap().keys().cloned().collect()
}

#[test]
fn disjoint_keys_are_unioned() {
    let merged = merge_json(json!({"a": 1, "b": [1, 2]}), json!({"c": "x", "d": {"e": true}}));
    assert_eq!(
        merged,
        json!({"a": 1, "b": [1, 2], "c": "x", "d": {"e": true}})
    );
}

#[test]
fn nested_objects_merge_recursively() {
    let merged = merge_json(json!({"a": {"x": 1, "y": 2}}), json!({"a": {"y": 3}}));
    assert_eq!(merged, json!({"a": {"x": 1, "y": 3}}));
}

#[test]
fn null_removes_field() {
    let merged = merge_json(json!({"a": 1, "b": 2}), json!({"a": null}));
    assert_eq!(merged, json!({"b": 2}));

    let merged = merge_json(json!({"a": {"x": 1, "y": 2}}), json!({"a": {"x": null}, "z": null}));
    assert_eq!(merged, json!({"a": {"y": 2}}));
}

#[test]
fn arrays_and_scalars_replace() {
    let merged = merge_json(
        json!({"list": [1, 2, 3], "obj": {"k": 1}, "n": 1}),
        json!({"list": [4], "obj": "flat", "n": {"nested": 1}}),
    );
    assert_eq!(merged, json!({"list": [4], "obj": "flat", "n": {"nested": 1}}));
}

#[test]
fn name_first_then_lexicographic_at_every_level() {
    let merged = merge_json(
        json!({"zeta": 1, "name": "Top", "child": {"b": 1, "name": "Child", "a": 2}}),
        json!({"alpha": {"y": 1, "x": {"q": 1, "name": "Deep", "p": 2}}}),
    );
    assert_eq!(key_order(&merged), vec!["name", "alpha", "child", "zeta"]);
    assert_eq!(key_order(&merged["child"]), vec!["name", "a", "b"]);
    assert_eq!(key_order(&merged["alpha"]), vec!["x", "y"]);
    assert_eq!(key_order(&merged["alpha"]["x"]), vec!["name", "p", "q"]);
}

#[test]
fn output_is_tab_indented() {
    let merged = merge(br#"{"name":"Foo","id":1}"#, br#"{"id":2,"extra":true}"#).unwrap();
    assert_eq!(
        String::from_utf8(merged).unwrap(),
        "{\n\t\"name\": \"Foo\",\n\t\"extra\": true,\n\t\"id\": 2\n}"
    );

    let nested = merge(br#"{"a":{"b":[1]}}"#, br#"{}"#).unwrap();
    assert_eq!(
        String::from_utf8(nested).unwrap(),
        "{\n\t\"a\": {\n\t\t\"b\": [\n\t\t\t1\n\t\t]\n\t}\n}"
    );
}

#[test]
fn reapplying_a_patch_is_a_no_op() {
    let existing = br#"{"name":"Page","layout":{"rows":[1,2],"width":10},"drop":true}"#;
    let incoming = br#"{"layout":{"width":12,"height":null},"drop":null,"added":"yes"}"#;
    let once = merge(existing, incoming).unwrap();
    let twice = merge(&once, incoming).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn unchanged_inputs_give_identical_bytes() {
    let existing = br#"{"b":1,"name":"n","a":{"d":1,"c":2}}"#;
    let incoming = br#"{"e":[{"z":1,"name":"inner","y":2}]}"#;
    assert_eq!(merge(existing, incoming).unwrap(), merge(existing, incoming).unwrap());
}

#[test]
fn invalid_json_is_a_merge_error() {
    let err = merge(b"\x89PNG\r\n", br#"{"a":1}"#).unwrap_err();
    assert_matches!(err, RetrieveError::Merge(message) if message.contains("existing"));

    let err = merge(br#"{"a":1}"#, b"{not json").unwrap_err();
    assert_matches!(err, RetrieveError::Merge(message) if message.contains("incoming"));
}

#[test]
fn non_object_documents_are_rejected() {
    assert_matches!(merge(b"[1,2]", b"{}"), Err(RetrieveError::Merge(_)));
    assert_matches!(merge(b"{}", b"\"text\""), Err(RetrieveError::Merge(_)));
    assert_matches!(merge(b"{}", b"null"), Err(RetrieveError::Merge(_)));
}

#[test]
fn numbers_keep_their_source_spelling() {
    let merged = merge(
        br#"{"name":"P","big":123456789012345678901234,"price":1.10,"exp":1e5}"#,
        br#"{"id":2}"#,
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(merged).unwrap(),
        "{\n\t\"name\": \"P\",\n\t\"big\": 123456789012345678901234,\n\t\"exp\": 1e5,\n\t\"id\": 2,\n\t\"price\": 1.10\n}"
    );
}
