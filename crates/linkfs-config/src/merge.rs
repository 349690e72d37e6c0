// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON layer merging

use serde_json::Value as J;

/// Objects merge recursively; arrays and scalars on the right replace the
/// left; a right-hand `null` keeps the left value.
pub fn merge_two_json(base: &mut J, layer: J) {
    match (base, layer) {
        (J::Object(a), J::Object(b)) => {
            for (k, v) in b {
                merge_two_json(a.entry(k).or_insert(J::Null), v);
            }
        }
        (_, J::Null) => {}
        (a, b) => *a = b,
    }
}

/// Sets `v` at a dotted key such as `crash-dumps.kind`, creating objects on
/// the way and replacing non-objects in the path.
pub fn insert_dotted(root: &mut J, dotted: &str, v: J) {
    let mut cur = root;
    let mut parts = dotted.split('.').peekable();
    while let Some(part) = parts.next() {
        if !cur.is_object() {
            *cur = J::Object(Default::default());
        }
        let Some(map) = cur.as_object_mut() else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), v);
            return;
        }
        cur = map
            .entry(part.to_string())
            .or_insert_with(|| J::Object(Default::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_merge_and_arrays_replace() {
        let mut base = json!({"crash-dumps": {"kind": "mini"}, "blacklist": ["a"]});
        merge_two_json(
            &mut base,
            json!({"crash-dumps": {"path": "/d"}, "blacklist": ["b"], "debug": null}),
        );
        assert_eq!(base["crash-dumps"]["kind"], "mini");
        assert_eq!(base["crash-dumps"]["path"], "/d");
        assert_eq!(base["blacklist"], json!(["b"]));
        assert!(base["debug"].is_null());
    }

    #[test]
    fn dotted_insert_builds_objects() {
        let mut root = json!({"crash-dumps": "flat"});
        insert_dotted(&mut root, "crash-dumps.kind", json!("full"));
        insert_dotted(&mut root, "instance", json!("demo"));
        assert_eq!(root["crash-dumps"]["kind"], "full");
        assert_eq!(root["instance"], "demo");
    }
}
