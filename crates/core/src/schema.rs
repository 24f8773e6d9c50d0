//! Merge-key schemas: the per-field hints the patch engine needs that the
//! generated models do not carry.

/// Schema for one object type, as a static table of its interesting fields.
///
/// Fields not listed are still diffed, just without hints: nested objects merge
/// key-by-key and lists are replaced wholesale.
#[derive(Debug)]
pub struct TypeSchema {
    pub name: &'static str,
    /// Root kind for top-level resource schemas; `None` for nested types.
    pub kind: Option<&'static str>,
    pub fields: &'static [FieldSchema],
}

/// Schema used when nothing is known about a value.
pub static UNTYPED: TypeSchema = TypeSchema { name: "untyped", kind: None, fields: &[] };

impl TypeSchema {
    pub const fn new(name: &'static str, fields: &'static [FieldSchema]) -> Self {
        Self { name, kind: None, fields }
    }

    pub const fn root(kind: &'static str, fields: &'static [FieldSchema]) -> Self {
        Self { name: kind, kind: Some(kind), fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Merge key of a list field, if it is merged by key.
    pub fn merge_key(&self, name: &str) -> Option<&'static str> {
        match self.field(name).map(|f| f.shape) {
            Some(Shape::List(ListStrategy::MergeByKey { key, .. })) => Some(key),
            _ => None,
        }
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.field(name).map(|f| f.read_only).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    /// Wire (JSON) name.
    pub name: &'static str,
    pub shape: Shape,
    /// Server-populated; excluded from regular patches.
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Shape {
    Scalar,
    /// String-keyed map, merged entry by entry.
    Map,
    Object(&'static TypeSchema),
    List(ListStrategy),
}

/// How a list-valued field is reconciled. A field carries exactly one strategy.
#[derive(Debug, Clone, Copy)]
pub enum ListStrategy {
    MergeByKey { key: &'static str, item: Option<&'static TypeSchema> },
    /// Scalars merged by value (`patchStrategy: merge` on a primitive list); order is ignored.
    MergeSet,
    Replace,
}

impl FieldSchema {
    pub const fn scalar(name: &'static str) -> Self {
        Self { name, shape: Shape::Scalar, read_only: false }
    }

    pub const fn map(name: &'static str) -> Self {
        Self { name, shape: Shape::Map, read_only: false }
    }

    pub const fn object(name: &'static str, schema: &'static TypeSchema) -> Self {
        Self { name, shape: Shape::Object(schema), read_only: false }
    }

    pub const fn keyed(name: &'static str, key: &'static str, item: &'static TypeSchema) -> Self {
        Self { name, shape: Shape::List(ListStrategy::MergeByKey { key, item: Some(item) }), read_only: false }
    }

    pub const fn keyed_scalar(name: &'static str, key: &'static str) -> Self {
        Self { name, shape: Shape::List(ListStrategy::MergeByKey { key, item: None }), read_only: false }
    }

    pub const fn set_list(name: &'static str) -> Self {
        Self { name, shape: Shape::List(ListStrategy::MergeSet), read_only: false }
    }

    pub const fn replace_list(name: &'static str) -> Self {
        Self { name, shape: Shape::List(ListStrategy::Replace), read_only: false }
    }

    pub const fn read_only(self) -> Self {
        Self { name: self.name, shape: self.shape, read_only: true }
    }

    /// Schema to use for the value of this field, when it is an object.
    pub fn object_schema(&self) -> &'static TypeSchema {
        match self.shape {
            Shape::Object(s) => s,
            _ => &UNTYPED,
        }
    }
}
