use kubeline_core::{Error, Result};
use serde_json::{Map, Value as Json};

use crate::path::key_text;
use crate::{FieldPath, PatchDocument, PatchOp, Segment};

/// Apply a document to `target` in order.
///
/// Intermediate objects are created for `Set` and `AppendItem`. Removing
/// something that is already gone is a no-op. A keyed selector that matches
/// nothing on the way to a `Set` is an error.
pub fn apply_patch(target: &mut Json, doc: &PatchDocument) -> Result<()> {
    for op in doc {
        apply_op(target, op)?;
    }
    Ok(())
}

pub(crate) fn apply_op(target: &mut Json, op: &PatchOp) -> Result<()> {
    match op {
        PatchOp::Set { path, value } => {
            let Some(last) = path.last() else {
                *target = value.clone();
                return Ok(());
            };
            let parent = walk(target, path.parent_segments(), true, path)?.ok_or_else(|| missing(path))?;
            match last {
                Segment::Field(name) => {
                    if parent.is_null() {
                        *parent = Json::Object(Map::new());
                    }
                    let obj = parent.as_object_mut().ok_or_else(|| not_an(path, "object"))?;
                    obj.insert(name.clone(), value.clone());
                }
                Segment::Keyed { key, value: kv } => {
                    let list = parent.as_array_mut().ok_or_else(|| not_an(path, "array"))?;
                    let slot = list.iter_mut().find(|el| el.get(key.as_str()) == Some(kv)).ok_or_else(|| missing(path))?;
                    *slot = value.clone();
                }
            }
        }
        PatchOp::Remove { path } => {
            let Some(last) = path.last() else {
                *target = Json::Null;
                return Ok(());
            };
            let Some(parent) = walk(target, path.parent_segments(), false, path)? else {
                return Ok(());
            };
            match (last, parent) {
                (Segment::Field(name), Json::Object(obj)) => {
                    obj.remove(name);
                }
                (Segment::Keyed { key, value }, Json::Array(list)) => {
                    list.retain(|el| el.get(key.as_str()) != Some(value));
                }
                _ => {}
            }
        }
        PatchOp::AppendItem { path, value } => {
            let list = walk(target, path.segments(), true, path)?.ok_or_else(|| missing(path))?;
            if list.is_null() {
                *list = Json::Array(Vec::new());
            }
            let items = list.as_array_mut().ok_or_else(|| not_an(path, "array"))?;
            // scalars are set members
            if value.is_object() || !items.contains(value) {
                items.push(value.clone());
            }
        }
        PatchOp::DeleteValue { path, value } => {
            if let Some(Json::Array(list)) = walk(target, path.segments(), false, path)? {
                list.retain(|el| el != value);
            }
        }
        PatchOp::DeleteItem { path, key, value } => {
            if let Some(Json::Array(list)) = walk(target, path.segments(), false, path)? {
                list.retain(|el| el.get(key.as_str()) != Some(value));
            }
        }
        PatchOp::SetOrder { path, key, order } => {
            if let Some(Json::Array(list)) = walk(target, path.segments(), false, path)? {
                reorder(list, key, order);
            }
        }
    }
    Ok(())
}

/// Move elements named in `order` to the front, in that order; the rest keep their
/// relative positions after them.
pub(crate) fn reorder(list: &mut Vec<Json>, key: &str, order: &[Json]) {
    let mut rest = std::mem::take(list);
    for k in order {
        if let Some(i) = rest.iter().position(|el| el.get(key) == Some(k)) {
            list.push(rest.remove(i));
        }
    }
    list.append(&mut rest);
}

/// Follow `segs` from `cur`. With `create`, missing object fields are inserted as
/// they are crossed; without it a missing step yields `Ok(None)`.
pub(crate) fn walk<'a>(
    mut cur: &'a mut Json,
    segs: &[Segment],
    create: bool,
    path: &FieldPath,
) -> Result<Option<&'a mut Json>> {
    for seg in segs {
        cur = match seg {
            Segment::Field(name) => {
                if cur.is_null() && create {
                    *cur = Json::Object(Map::new());
                }
                let obj = match cur.as_object_mut() {
                    Some(obj) => obj,
                    None if create => return Err(not_an(path, "object")),
                    None => return Ok(None),
                };
                if create {
                    obj.entry(name.clone()).or_insert(Json::Null)
                } else {
                    match obj.get_mut(name) {
                        Some(v) => v,
                        None => return Ok(None),
                    }
                }
            }
            Segment::Keyed { key, value } => {
                let list = match cur.as_array_mut() {
                    Some(list) => list,
                    None if create => return Err(not_an(path, "array")),
                    None => return Ok(None),
                };
                match list.iter_mut().find(|el| el.get(key.as_str()) == Some(value)) {
                    Some(el) => el,
                    None if create => {
                        return Err(Error::InvalidPatch(format!(
                            "{}: no element with {}={}",
                            path,
                            key,
                            key_text(value)
                        )))
                    }
                    None => return Ok(None),
                }
            }
        };
    }
    Ok(Some(cur))
}

fn missing(path: &FieldPath) -> Error {
    Error::InvalidPatch(format!("{}: target does not exist", path))
}

fn not_an(path: &FieldPath, what: &str) -> Error {
    Error::InvalidPatch(format!("{}: expected an {}", path, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut v = json!({ "metadata": { "name": "a" } });
        let p = FieldPath::root().child("metadata").child("labels").child("app");
        apply_patch(&mut v, &PatchDocument::new(vec![PatchOp::Set { path: p, value: json!("web") }])).expect("apply");
        assert_eq!(v, json!({ "metadata": { "name": "a", "labels": { "app": "web" } } }));
    }

    #[test]
    fn keyed_ops_edit_lists_in_place() {
        let mut v = json!({ "c": [ { "name": "a", "x": 1 }, { "name": "b" }, { "name": "z" } ] });
        let list = FieldPath::root().child("c");
        let doc = PatchDocument::new(vec![
            PatchOp::Set { path: list.keyed("name", json!("a")).child("x"), value: json!(2) },
            PatchOp::DeleteItem { path: list.clone(), key: "name".into(), value: json!("b") },
            PatchOp::AppendItem { path: list.clone(), value: json!({ "name": "c" }) },
            PatchOp::SetOrder { path: list, key: "name".into(), order: vec![json!("c"), json!("a")] },
        ]);
        apply_patch(&mut v, &doc).expect("apply");
        assert_eq!(v, json!({ "c": [ { "name": "c" }, { "name": "a", "x": 2 }, { "name": "z" } ] }));
    }

    #[test]
    fn set_values_are_added_once_and_removed_everywhere() {
        let mut v = json!({ "f": ["a", "b", "a"] });
        let f = FieldPath::root().child("f");
        let doc = PatchDocument::new(vec![
            PatchOp::DeleteValue { path: f.clone(), value: json!("a") },
            PatchOp::AppendItem { path: f.clone(), value: json!("b") },
            PatchOp::AppendItem { path: f, value: json!("c") },
        ]);
        apply_patch(&mut v, &doc).expect("apply");
        assert_eq!(v, json!({ "f": ["b", "c"] }));
    }

    #[test]
    fn removing_missing_paths_is_a_no_op() {
        let mut v = json!({ "a": 1 });
        let doc = PatchDocument::new(vec![
            PatchOp::Remove { path: FieldPath::root().child("b").child("c") },
            PatchOp::DeleteItem { path: FieldPath::root().child("list"), key: "name".into(), value: json!("x") },
        ]);
        apply_patch(&mut v, &doc).expect("apply");
        assert_eq!(v, json!({ "a": 1 }));
    }

    #[test]
    fn set_through_unknown_element_fails() {
        let mut v = json!({ "c": [] });
        let p = FieldPath::root().child("c").keyed("name", json!("nope")).child("x");
        let err = apply_patch(&mut v, &PatchDocument::new(vec![PatchOp::Set { path: p, value: json!(1) }]));
        assert!(matches!(err, Err(Error::InvalidPatch(_))));
    }
}
