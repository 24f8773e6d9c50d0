//! Kubeline core types: resource identity and routing descriptors, merge-key
//! schemas, list/watch envelopes and the shared error taxonomy.
//!
//! Everything here is plain data. Descriptors and schemas are built once and
//! shared read-only; events and pages are owned by whoever receives them.

#![forbid(unsafe_code)]

mod descriptor;
mod error;
mod event;
mod schema;

pub use descriptor::{GroupVersionKind, PathParams, ResourceDescriptor, Verb};
pub use error::{Error, KubeApiError, Result};
pub use event::{DeleteResult, ListMeta, ListPage, ObjectList, Status, WatchEvent, WatchEventType};
pub use schema::{FieldSchema, ListStrategy, Shape, TypeSchema, UNTYPED};

pub mod prelude {
    pub use super::{
        Error, FieldSchema, GroupVersionKind, KubeApiError, ListPage, ListStrategy, PathParams, ResourceDescriptor,
        Result, Shape, TypeSchema, Verb, WatchEvent, WatchEventType,
    };
}
