//! The claims tree: a nested-map bag addressed by `Permission.claim_path`,
//! populated by the Authorization Evaluator and read by filters/upstream.

use serde_json::{Map, Value};

/// Writes `value` at `path` into `root`, creating intermediate object nodes
/// as needed. An empty path is a no-op (callers must not produce one —
/// `Permission.claim_path` is non-empty by invariant).
pub fn set_claim(root: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        return;
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let mut cursor = root.as_object_mut().expect("root coerced to object above");
    for key in &path[..path.len() - 1] {
        let entry = cursor
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry.as_object_mut().expect("entry coerced to object above");
    }
    cursor.insert(path[path.len() - 1].clone(), value);
}
