//! YAML manifests for human-authored input.

use kubeline_core::{Error, GroupVersionKind, Result};
use serde::Deserialize;
use serde_json::Value as Json;

fn max_yaml_bytes() -> usize {
    std::env::var("KUBELINE_MAX_YAML_BYTES").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(1_000_000)
}

fn max_yaml_nodes() -> usize {
    std::env::var("KUBELINE_MAX_YAML_NODES").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(100_000)
}

fn node_count_exceeds(v: &Json, max: usize) -> bool {
    let mut stack = vec![v];
    let mut seen = 0usize;
    while let Some(cur) = stack.pop() {
        seen += 1;
        if seen > max {
            return true;
        }
        match cur {
            Json::Object(map) => stack.extend(map.values()),
            Json::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
    false
}

/// Parse a single YAML document into JSON.
pub fn from_yaml(yaml: &str) -> Result<Json> {
    let mut docs = from_yaml_all(yaml)?;
    match docs.len() {
        1 => Ok(docs.remove(0)),
        0 => Err(Error::InvalidManifest("empty document".into())),
        n => Err(Error::InvalidManifest(format!("expected one document, found {}", n))),
    }
}

/// Parse a `---`-separated stream, skipping empty documents.
pub fn from_yaml_all(yaml: &str) -> Result<Vec<Json>> {
    if yaml.len() > max_yaml_bytes() {
        return Err(Error::InvalidManifest(format!("YAML payload too large (>{} bytes)", max_yaml_bytes())));
    }
    let mut out = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let val = serde_yaml::Value::deserialize(doc).map_err(|e| Error::InvalidManifest(format!("parsing YAML: {}", e)))?;
        if val.is_null() {
            continue;
        }
        let json = serde_json::to_value(val).map_err(|e| Error::InvalidManifest(format!("converting YAML to JSON: {}", e)))?;
        if node_count_exceeds(&json, max_yaml_nodes()) {
            return Err(Error::InvalidManifest(format!("YAML document too complex (>{} nodes)", max_yaml_nodes())));
        }
        out.push(json);
    }
    Ok(out)
}

/// What a manifest addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub gvk: GroupVersionKind,
    pub name: String,
    pub namespace: Option<String>,
}

/// Read `apiVersion`, `kind` and `metadata.name`/`namespace`; `ns_override` wins.
pub fn target(doc: &Json, ns_override: Option<&str>) -> Result<Target> {
    let api_version = doc
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidManifest("missing apiVersion".into()))?;
    let kind = doc.get("kind").and_then(|v| v.as_str()).ok_or_else(|| Error::InvalidManifest("missing kind".into()))?;
    let meta = doc.get("metadata");
    let name = meta
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidManifest("missing metadata.name".into()))?;
    let namespace = ns_override
        .map(str::to_string)
        .or_else(|| meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).map(str::to_string));
    Ok(Target { gvk: GroupVersionKind::from_api_version(api_version, kind), name: name.to_string(), namespace })
}
