use kubeline_core::{FieldSchema, ListStrategy, Shape, TypeSchema, UNTYPED};
use serde_json::{Map, Value as Json};

/// Canonical form used for comparison: `null` object entries and read-only fields
/// (including the root `status`) are dropped.
pub fn normalize(value: &Json, schema: &TypeSchema) -> Json {
    strip(value, schema, true)
}

pub(crate) fn strip(value: &Json, schema: &TypeSchema, root: bool) -> Json {
    match value {
        Json::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if v.is_null() || skipped(schema, k, root) {
                    continue;
                }
                out.insert(k.clone(), strip_field(v, schema.field(k)));
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(|v| strip(v, &UNTYPED, false)).collect()),
        other => other.clone(),
    }
}

pub(crate) fn strip_field(value: &Json, field: Option<&FieldSchema>) -> Json {
    match (field.map(|f| f.shape), value) {
        (Some(Shape::Object(s)), _) => strip(value, s, false),
        (Some(Shape::List(ListStrategy::MergeByKey { item: Some(s), .. })), Json::Array(items)) => {
            Json::Array(items.iter().map(|v| strip(v, s, false)).collect())
        }
        _ => strip(value, &UNTYPED, false),
    }
}

/// Fields that regular patches never touch.
pub(crate) fn skipped(schema: &TypeSchema, field: &str, root: bool) -> bool {
    schema.is_read_only(field) || (root && field == "status")
}
