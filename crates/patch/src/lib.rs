//! Kubeline patch engine: schema-aware strategic merge diffs.
//!
//! [`compute_patch`] walks two object trees with a merge-key [`TypeSchema`] and
//! produces a [`PatchDocument`]: an ordered list of field-level operations.
//! Keyed lists merge element by element, scalar sets merge by value, plain lists
//! are replaced whole, and a
//! field missing from the new object is never read as a deletion; only an
//! explicit `null` removes. The document can be applied locally, rendered as a
//! strategic merge body for the API server, or as an RFC 6902 JSON patch.

#![forbid(unsafe_code)]

use serde::Serialize;
use serde_json::Value as Json;

mod apply;
mod diff;
pub mod manifest;
mod normalize;
mod path;
mod render;

pub use apply::apply_patch;
pub use diff::{compute_patch, compute_patch_typed, compute_status_patch};
pub use normalize::normalize;
pub use path::{FieldPath, Segment};

pub use kubeline_core::{Error, Result, TypeSchema};

/// A single field-level change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PatchOp {
    Set { path: FieldPath, value: Json },
    Remove { path: FieldPath },
    /// Append an element to the keyed list or scalar set at `path`.
    AppendItem { path: FieldPath, value: Json },
    /// Remove every occurrence of the scalar `value` from the set at `path`.
    DeleteValue { path: FieldPath, value: Json },
    /// Remove the element whose `key` equals `value` from the list at `path`.
    DeleteItem { path: FieldPath, key: String, value: Json },
    /// Final element order of the keyed list at `path`, by key value.
    SetOrder { path: FieldPath, key: String, order: Vec<Json> },
}

impl PatchOp {
    pub fn path(&self) -> &FieldPath {
        match self {
            PatchOp::Set { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::AppendItem { path, .. }
            | PatchOp::DeleteValue { path, .. }
            | PatchOp::DeleteItem { path, .. }
            | PatchOp::SetOrder { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatchDocument {
    ops: Vec<PatchOp>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl PatchDocument {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    pub fn summary(&self) -> DiffSummary {
        let mut s = DiffSummary::default();
        for op in &self.ops {
            match op {
                PatchOp::AppendItem { .. } => s.adds += 1,
                PatchOp::Set { .. } | PatchOp::SetOrder { .. } => s.updates += 1,
                PatchOp::Remove { .. } | PatchOp::DeleteItem { .. } | PatchOp::DeleteValue { .. } => s.removes += 1,
            }
        }
        s
    }

    /// `application/strategic-merge-patch+json` body.
    pub fn to_strategic_merge(&self) -> Json {
        render::strategic_merge(self)
    }

    /// RFC 6902 operations against `pre_image`; keyed selectors become indices.
    pub fn to_json_patch(&self, pre_image: &Json) -> Result<Json> {
        render::json_patch(self, pre_image)
    }
}

impl<'a> IntoIterator for &'a PatchDocument {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
