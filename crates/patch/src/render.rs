use kubeline_core::{Error, Result};
use serde_json::{json, Map, Value as Json};

use crate::apply::apply_op;
use crate::path::key_text;
use crate::{FieldPath, PatchDocument, PatchOp, Segment};

pub(crate) fn strategic_merge(doc: &PatchDocument) -> Json {
    let mut out = Json::Object(Map::new());
    for op in doc {
        match op {
            PatchOp::Set { path, value } => match path.last() {
                None => out = value.clone(),
                Some(Segment::Field(name)) => {
                    object_at(slot(&mut out, path.parent_segments())).insert(name.clone(), value.clone());
                }
                Some(Segment::Keyed { key, value: kv }) => {
                    let list = list_at(slot(&mut out, path.parent_segments()));
                    *element_at(list, key, kv) = value.clone();
                }
            },
            PatchOp::Remove { path } => match path.last() {
                None => out = Json::Null,
                Some(Segment::Field(name)) => {
                    object_at(slot(&mut out, path.parent_segments())).insert(name.clone(), Json::Null);
                }
                Some(Segment::Keyed { key, value }) => {
                    list_at(slot(&mut out, path.parent_segments())).push(delete_marker(key, value));
                }
            },
            PatchOp::AppendItem { path, value } => {
                list_at(slot(&mut out, path.segments())).push(value.clone());
            }
            PatchOp::DeleteItem { path, key, value } => {
                list_at(slot(&mut out, path.segments())).push(delete_marker(key, value));
            }
            PatchOp::DeleteValue { path, value } => {
                if let Some(Segment::Field(name)) = path.last() {
                    let parent = object_at(slot(&mut out, path.parent_segments()));
                    let directive = parent.entry(format!("$deleteFromPrimitiveList/{}", name)).or_insert(Json::Null);
                    list_at(directive).push(value.clone());
                }
            }
            PatchOp::SetOrder { path, key, order } => {
                if let Some(Segment::Field(name)) = path.last() {
                    let order: Vec<Json> = order.iter().map(|v| json!({ key.as_str(): v })).collect();
                    object_at(slot(&mut out, path.parent_segments()))
                        .insert(format!("$setElementOrder/{}", name), Json::Array(order));
                }
            }
        }
    }
    out
}

fn delete_marker(key: &str, value: &Json) -> Json {
    json!({ key: value, "$patch": "delete" })
}

/// Location inside the patch body, creating objects and keyed elements as needed.
fn slot<'a>(mut cur: &'a mut Json, segs: &[Segment]) -> &'a mut Json {
    for seg in segs {
        cur = match seg {
            Segment::Field(name) => object_at(cur).entry(name.clone()).or_insert(Json::Null),
            Segment::Keyed { key, value } => element_at(list_at(cur), key, value),
        };
    }
    cur
}

fn object_at(v: &mut Json) -> &mut Map<String, Json> {
    if !v.is_object() {
        *v = Json::Object(Map::new());
    }
    match v {
        Json::Object(m) => m,
        _ => unreachable!("replaced with an object above"),
    }
}

fn list_at(v: &mut Json) -> &mut Vec<Json> {
    if !v.is_array() {
        *v = Json::Array(Vec::new());
    }
    match v {
        Json::Array(items) => items,
        _ => unreachable!("replaced with an array above"),
    }
}

fn element_at<'a>(list: &'a mut Vec<Json>, key: &str, value: &Json) -> &'a mut Json {
    let idx = match list.iter().position(|el| el.get(key) == Some(value)) {
        Some(i) => i,
        None => {
            list.push(json!({ key: value }));
            list.len() - 1
        }
    };
    &mut list[idx]
}

pub(crate) fn json_patch(doc: &PatchDocument, pre_image: &Json) -> Result<Json> {
    let mut state = pre_image.clone();
    let mut out = Vec::new();
    for op in doc {
        match op {
            PatchOp::Set { path, value } => out.push(add_or_replace(&state, path, value)?),
            PatchOp::Remove { path } => {
                if let Some(p) = pointer(&state, path.segments()) {
                    out.push(json!({ "op": "remove", "path": p }));
                }
            }
            PatchOp::AppendItem { path, value } => match pointer(&state, path.segments()) {
                Some(p) if state.pointer(&p).map_or(false, Json::is_array) => {
                    let present = !value.is_object()
                        && state.pointer(&p).and_then(Json::as_array).map_or(false, |items| items.contains(value));
                    if !present {
                        out.push(json!({ "op": "add", "path": format!("{}/-", p), "value": value }));
                    }
                }
                _ => out.push(add_or_replace(&state, path, &Json::Array(vec![value.clone()]))?),
            },
            PatchOp::DeleteItem { path, key, value } => {
                if let Some(p) = pointer(&state, path.segments()) {
                    let idx = state
                        .pointer(&p)
                        .and_then(Json::as_array)
                        .and_then(|items| items.iter().position(|el| el.get(key.as_str()) == Some(value)));
                    if let Some(i) = idx {
                        out.push(json!({ "op": "remove", "path": format!("{}/{}", p, i) }));
                    }
                }
            }
            PatchOp::DeleteValue { path, value } => {
                if let Some(p) = pointer(&state, path.segments()) {
                    let hits: Vec<usize> = state
                        .pointer(&p)
                        .and_then(Json::as_array)
                        .map(|items| items.iter().enumerate().filter(|(_, el)| *el == value).map(|(i, _)| i).collect())
                        .unwrap_or_default();
                    for i in hits.into_iter().rev() {
                        out.push(json!({ "op": "remove", "path": format!("{}/{}", p, i) }));
                    }
                }
            }
            PatchOp::SetOrder { path, .. } => {
                if let Some(p) = pointer(&state, path.segments()) {
                    let mut after = state.clone();
                    apply_op(&mut after, op)?;
                    if let Some(list) = after.pointer(&p) {
                        out.push(json!({ "op": "replace", "path": p, "value": list }));
                    }
                }
            }
        }
        apply_op(&mut state, op)?;
    }
    Ok(Json::Array(out))
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// JSON pointer for an existing location; keyed selectors become indices.
fn pointer(state: &Json, segs: &[Segment]) -> Option<String> {
    let mut cur = state;
    let mut out = String::new();
    for seg in segs {
        match seg {
            Segment::Field(name) => {
                cur = cur.as_object()?.get(name)?;
                out.push('/');
                out.push_str(&escape(name));
            }
            Segment::Keyed { key, value } => {
                let items = cur.as_array()?;
                let i = items.iter().position(|el| el.get(key.as_str()) == Some(value))?;
                cur = &items[i];
                out.push_str(&format!("/{}", i));
            }
        }
    }
    Some(out)
}

/// `replace` when the location exists, else `add` at the first missing field with
/// the remaining fields wrapped around the value.
fn add_or_replace(state: &Json, path: &FieldPath, value: &Json) -> Result<Json> {
    let segs = path.segments();
    let mut cur = state;
    let mut out = String::new();
    for (i, seg) in segs.iter().enumerate() {
        match seg {
            Segment::Field(name) => match cur.as_object() {
                Some(obj) => match obj.get(name) {
                    Some(next) if !next.is_null() || i + 1 == segs.len() => {
                        cur = next;
                        out.push('/');
                        out.push_str(&escape(name));
                    }
                    Some(_) => {
                        out.push('/');
                        out.push_str(&escape(name));
                        let wrapped = wrap(&segs[i + 1..], value, path)?;
                        return Ok(json!({ "op": "replace", "path": out, "value": wrapped }));
                    }
                    None => {
                        out.push('/');
                        out.push_str(&escape(name));
                        let wrapped = wrap(&segs[i + 1..], value, path)?;
                        return Ok(json!({ "op": "add", "path": out, "value": wrapped }));
                    }
                },
                None => {
                    let wrapped = wrap(&segs[i..], value, path)?;
                    return Ok(json!({ "op": "replace", "path": out, "value": wrapped }));
                }
            },
            Segment::Keyed { key, value: kv } => {
                let found = cur
                    .as_array()
                    .and_then(|items| items.iter().position(|el| el.get(key.as_str()) == Some(kv)).map(|i| (i, items)));
                match found {
                    Some((idx, items)) => {
                        cur = &items[idx];
                        out.push_str(&format!("/{}", idx));
                    }
                    None => {
                        return Err(Error::InvalidPatch(format!(
                            "{}: no element with {}={}",
                            path,
                            key,
                            key_text(kv)
                        )))
                    }
                }
            }
        }
    }
    Ok(json!({ "op": "replace", "path": out, "value": value }))
}

fn wrap(segs: &[Segment], value: &Json, path: &FieldPath) -> Result<Json> {
    let mut acc = value.clone();
    for seg in segs.iter().rev() {
        match seg {
            Segment::Field(name) => {
                let mut m = Map::new();
                m.insert(name.clone(), acc);
                acc = Json::Object(m);
            }
            Segment::Keyed { .. } => {
                return Err(Error::InvalidPatch(format!("{}: keyed element does not exist", path)));
            }
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn containers() -> FieldPath {
        FieldPath::root().child("spec").child("containers")
    }

    #[test]
    fn strategic_merge_uses_directives() {
        let doc = PatchDocument::new(vec![
            PatchOp::Set { path: containers().keyed("name", json!("web")).child("image"), value: json!("nginx:2") },
            PatchOp::DeleteItem { path: containers(), key: "name".into(), value: json!("sidecar") },
            PatchOp::AppendItem { path: containers(), value: json!({ "name": "log", "image": "busybox" }) },
            PatchOp::SetOrder { path: containers(), key: "name".into(), order: vec![json!("log"), json!("web")] },
            PatchOp::Remove { path: FieldPath::root().child("metadata").child("labels").child("tier") },
        ]);
        let body = doc.to_strategic_merge();
        assert_eq!(
            body,
            json!({
                "metadata": { "labels": { "tier": null } },
                "spec": {
                    "containers": [
                        { "name": "web", "image": "nginx:2" },
                        { "name": "sidecar", "$patch": "delete" },
                        { "name": "log", "image": "busybox" }
                    ],
                    "$setElementOrder/containers": [ { "name": "log" }, { "name": "web" } ]
                }
            })
        );
    }

    #[test]
    fn scalar_set_removals_use_the_primitive_list_directive() {
        let finalizers = FieldPath::root().child("metadata").child("finalizers");
        let doc = PatchDocument::new(vec![
            PatchOp::DeleteValue { path: finalizers.clone(), value: json!("a") },
            PatchOp::AppendItem { path: finalizers.clone(), value: json!("c") },
        ]);
        assert_eq!(
            doc.to_strategic_merge(),
            json!({ "metadata": { "$deleteFromPrimitiveList/finalizers": ["a"], "finalizers": ["c"] } })
        );
        let pre = json!({ "metadata": { "finalizers": ["a", "b", "a"] } });
        assert_eq!(
            doc.to_json_patch(&pre).expect("json patch"),
            json!([
                { "op": "remove", "path": "/metadata/finalizers/2" },
                { "op": "remove", "path": "/metadata/finalizers/0" },
                { "op": "add", "path": "/metadata/finalizers/-", "value": "c" }
            ])
        );
    }

    #[test]
    fn json_patch_resolves_indices_and_escapes() {
        let pre = json!({
            "metadata": { "annotations": {} },
            "spec": { "containers": [ { "name": "sidecar" }, { "name": "web", "image": "nginx:1" } ] }
        });
        let doc = PatchDocument::new(vec![
            PatchOp::DeleteItem { path: containers(), key: "name".into(), value: json!("sidecar") },
            PatchOp::Set { path: containers().keyed("name", json!("web")).child("image"), value: json!("nginx:2") },
            PatchOp::Set {
                path: FieldPath::root().child("metadata").child("annotations").child("example.com/owner"),
                value: json!("team"),
            },
            PatchOp::Set { path: FieldPath::root().child("spec").child("strategy").child("type"), value: json!("Recreate") },
        ]);
        let ops = doc.to_json_patch(&pre).expect("json patch");
        assert_eq!(
            ops,
            json!([
                { "op": "remove", "path": "/spec/containers/0" },
                { "op": "replace", "path": "/spec/containers/0/image", "value": "nginx:2" },
                { "op": "add", "path": "/metadata/annotations/example.com~1owner", "value": "team" },
                { "op": "add", "path": "/spec/strategy", "value": { "type": "Recreate" } }
            ])
        );
    }
}
