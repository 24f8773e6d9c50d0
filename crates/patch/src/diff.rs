use kubeline_core::{Error, FieldSchema, ListStrategy, Result, Shape, TypeSchema, UNTYPED};
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::normalize::{skipped, strip, strip_field};
use crate::{FieldPath, PatchDocument, PatchOp};

type Object = Map<String, Json>;

/// Diff `old` into `new`, skipping `status` and read-only fields.
pub fn compute_patch(old: &Json, new: &Json, schema: &TypeSchema) -> Result<PatchDocument> {
    let (o, n) = check_compatible(old, new, schema)?;
    let mut ops = Vec::new();
    diff_object(&FieldPath::root(), o, n, schema, true, &mut ops);
    debug!(schema = schema.name, ops = ops.len(), "patch computed");
    Ok(PatchDocument::new(ops))
}

/// Typed variant of [`compute_patch`]; both sides go through serde first.
pub fn compute_patch_typed<K: Serialize>(old: &K, new: &K, schema: &TypeSchema) -> Result<PatchDocument> {
    let old = serde_json::to_value(old).map_err(Error::Encode)?;
    let new = serde_json::to_value(new).map_err(Error::Encode)?;
    compute_patch(&old, &new, schema)
}

/// Diff only the root read-only subtrees (`status`), for the status subresource.
pub fn compute_status_patch(old: &Json, new: &Json, schema: &TypeSchema) -> Result<PatchDocument> {
    let (o, n) = check_compatible(old, new, schema)?;
    let mut ops = Vec::new();
    let root = FieldPath::root();
    for (k, nv) in n {
        if !skipped(schema, k, true) {
            continue;
        }
        diff_value(&root.child(k.as_str()), o.get(k), nv, schema.field(k), &mut ops);
    }
    debug!(schema = schema.name, ops = ops.len(), "status patch computed");
    Ok(PatchDocument::new(ops))
}

fn check_compatible<'a>(old: &'a Json, new: &'a Json, schema: &TypeSchema) -> Result<(&'a Object, &'a Object)> {
    let (Some(o), Some(n)) = (old.as_object(), new.as_object()) else {
        return Err(Error::IncompatibleSchema("both sides must be JSON objects".into()));
    };
    for field in ["apiVersion", "kind"] {
        if let (Some(a), Some(b)) = (o.get(field), n.get(field)) {
            if a != b {
                return Err(Error::IncompatibleSchema(format!("{} differs: {} vs {}", field, a, b)));
            }
        }
    }
    if let (Some(expected), Some(actual)) = (schema.kind, n.get("kind").and_then(|k| k.as_str())) {
        if expected != actual {
            return Err(Error::IncompatibleSchema(format!("schema is for {}, object is {}", expected, actual)));
        }
    }
    Ok((o, n))
}

fn diff_object(path: &FieldPath, old: &Object, new: &Object, schema: &TypeSchema, root: bool, ops: &mut Vec<PatchOp>) {
    for (k, nv) in new {
        if skipped(schema, k, root) {
            continue;
        }
        diff_value(&path.child(k.as_str()), old.get(k), nv, schema.field(k), ops);
    }
}

fn diff_value(path: &FieldPath, old: Option<&Json>, new: &Json, field: Option<&FieldSchema>, ops: &mut Vec<PatchOp>) {
    if new.is_null() {
        if old.map_or(false, |o| !o.is_null()) {
            ops.push(PatchOp::Remove { path: path.clone() });
        }
        return;
    }
    let old = match old {
        Some(o) if !o.is_null() => o,
        _ => {
            ops.push(PatchOp::Set { path: path.clone(), value: strip_field(new, field) });
            return;
        }
    };
    match (field.map(|f| f.shape), old, new) {
        (Some(Shape::Object(s)), Json::Object(o), Json::Object(n)) => diff_object(path, o, n, s, false, ops),
        (Some(Shape::Map) | None, Json::Object(o), Json::Object(n)) => diff_object(path, o, n, &UNTYPED, false, ops),
        (Some(Shape::List(ListStrategy::MergeByKey { key, item })), Json::Array(o), Json::Array(n)) => {
            diff_keyed(path, o, n, key, item.unwrap_or(&UNTYPED), ops)
        }
        (Some(Shape::List(ListStrategy::MergeSet)), Json::Array(o), Json::Array(n)) => diff_set(path, o, n, ops),
        _ => {
            let value = strip_field(new, field);
            if strip_field(old, field) != value {
                ops.push(PatchOp::Set { path: path.clone(), value });
            }
        }
    }
}

fn diff_keyed(path: &FieldPath, old: &[Json], new: &[Json], key: &str, item: &TypeSchema, ops: &mut Vec<PatchOp>) {
    let (Some(old_keys), Some(new_keys)) = (merge_keys(old, key), merge_keys(new, key)) else {
        // No stable identity to align on: replace the whole list.
        let o: Vec<Json> = old.iter().map(|v| strip(v, item, false)).collect();
        let n: Vec<Json> = new.iter().map(|v| strip(v, item, false)).collect();
        if o != n {
            ops.push(PatchOp::Set { path: path.clone(), value: Json::Array(n) });
        }
        return;
    };

    let mut appended = Vec::new();
    for (nk, nv) in new_keys.iter().zip(new) {
        match old_keys.iter().position(|ok| ok == nk) {
            Some(i) => {
                if let (Json::Object(o), Json::Object(n)) = (&old[i], nv) {
                    diff_object(&path.keyed(key, nk.clone()), o, n, item, false, ops);
                }
            }
            None => appended.push((nk.clone(), strip(nv, item, false))),
        }
    }

    let mut expected = Vec::with_capacity(new_keys.len());
    for ok in &old_keys {
        if new_keys.contains(ok) {
            expected.push(ok.clone());
        } else {
            ops.push(PatchOp::DeleteItem { path: path.clone(), key: key.to_string(), value: ok.clone() });
        }
    }
    for (k, value) in appended {
        expected.push(k);
        ops.push(PatchOp::AppendItem { path: path.clone(), value });
    }
    if expected != new_keys {
        ops.push(PatchOp::SetOrder { path: path.clone(), key: key.to_string(), order: new_keys });
    }
}

fn diff_set(path: &FieldPath, old: &[Json], new: &[Json], ops: &mut Vec<PatchOp>) {
    let scalar = |v: &Json| !(v.is_object() || v.is_array());
    if !old.iter().chain(new).all(scalar) {
        if old != new {
            ops.push(PatchOp::Set { path: path.clone(), value: Json::Array(new.to_vec()) });
        }
        return;
    }
    let mut seen: Vec<&Json> = Vec::new();
    for v in old {
        if !new.contains(v) && !seen.contains(&v) {
            seen.push(v);
            ops.push(PatchOp::DeleteValue { path: path.clone(), value: v.clone() });
        }
    }
    seen.clear();
    for v in new {
        if !old.contains(v) && !seen.contains(&v) {
            seen.push(v);
            ops.push(PatchOp::AppendItem { path: path.clone(), value: v.clone() });
        }
    }
}

/// Key values of a list, or `None` if any element lacks a scalar key or keys repeat.
fn merge_keys(list: &[Json], key: &str) -> Option<Vec<Json>> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::with_capacity(list.len());
    for el in list {
        let k = el.as_object()?.get(key)?;
        if !(k.is_string() || k.is_number()) || !seen.insert(k.to_string()) {
            return None;
        }
        out.push(k.clone());
    }
    Some(out)
}
