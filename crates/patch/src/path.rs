use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use smallvec::SmallVec;

/// One step into a document: an object field or a list element selected by merge key.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Keyed { key: String, value: Json },
}

/// Location of a patch operation, rendered as `/spec/containers/[name=web]/image`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPath(SmallVec<[Segment; 6]>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, field: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.0.push(Segment::Field(field.into()));
        out
    }

    pub fn keyed(&self, key: impl Into<String>, value: Json) -> Self {
        let mut out = self.clone();
        out.0.push(Segment::Keyed { key: key.into(), value });
        out
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Segments up to (excluding) the last one.
    pub fn parent_segments(&self) -> &[Segment] {
        match self.0.len() {
            0 => &[],
            n => &self.0[..n - 1],
        }
    }

    pub fn starts_with(&self, other: &FieldPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }
}

/// Key values render bare when they are strings, as JSON otherwise.
pub(crate) fn key_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.0 {
            match seg {
                Segment::Field(name) => write!(f, "/{}", name)?,
                Segment::Keyed { key, value } => write!(f, "/[{}={}]", key, key_text(value))?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_and_selectors() {
        let p = FieldPath::root().child("spec").child("containers").keyed("name", Json::from("web")).child("image");
        assert_eq!(p.to_string(), "/spec/containers/[name=web]/image");
        let q = FieldPath::root().child("ports").keyed("containerPort", Json::from(8080));
        assert_eq!(q.to_string(), "/ports/[containerPort=8080]");
        assert_eq!(FieldPath::root().to_string(), "/");
    }

    #[test]
    fn prefix_checks() {
        let spec = FieldPath::root().child("spec");
        let image = spec.child("image");
        assert!(image.starts_with(&spec));
        assert!(!spec.starts_with(&image));
        assert_eq!(image.parent_segments(), spec.segments());
    }
}
