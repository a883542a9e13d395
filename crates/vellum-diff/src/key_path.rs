use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use vellum_schema::SchemaDescriptor;

use crate::error::{DiffError, DiffResult};
use crate::row_diff::SchemaLookup;

/// A dot-separated property path, e.g. `objectCol.boolCol`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> DiffResult<Self> {
        if path.split('.').any(str::is_empty) {
            return Err(DiffError::InvalidKeyPath {
                path: path.to_owned(),
                reason: "empty path segment".to_owned(),
            });
        }
        Ok(Self {
            segments: path.split('.').map(str::to_owned).collect(),
        })
    }

    /// A single-segment path.
    pub fn property(name: &str) -> Self {
        Self {
            segments: vec![name.to_owned()],
        }
    }

    /// This path extended by one segment.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The top-level property this path starts at.
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` equals `other` or is a whole-segment prefix of it.
    pub fn is_prefix_of(&self, other: &KeyPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Whether either path is a prefix of the other.
    pub fn overlaps(&self, other: &KeyPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl FromStr for KeyPath {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Which changes an observer wants to hear about.
///
/// A filter path matches a changed path when either is a prefix of the
/// other: `dog.name` matches a change of `dog.name` and a reassignment of
/// `dog`, and `dogs` matches a change to any element's `dogs.name`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KeyPathFilter {
    #[default]
    All,
    Paths(Vec<KeyPath>),
}

impl KeyPathFilter {
    /// An empty path list observes everything.
    pub fn from_paths(paths: Vec<KeyPath>) -> Self {
        if paths.is_empty() {
            KeyPathFilter::All
        } else {
            KeyPathFilter::Paths(paths)
        }
    }

    /// Whether a transition that changed `changed` should be delivered.
    pub fn matches(&self, changed: &BTreeSet<KeyPath>) -> bool {
        match self {
            KeyPathFilter::All => !changed.is_empty(),
            KeyPathFilter::Paths(paths) => paths
                .iter()
                .any(|filter| changed.iter().any(|c| filter.overlaps(c))),
        }
    }

    /// The diff depth needed to see every filtered path, at least `minimum`.
    pub fn required_depth(&self, minimum: usize) -> usize {
        match self {
            KeyPathFilter::All => minimum,
            KeyPathFilter::Paths(paths) => paths
                .iter()
                .map(KeyPath::len)
                .fold(minimum, usize::max),
        }
    }
}

/// Resolve `path` against `schema`, following relationships.
///
/// Every segment must name a property of the class reached so far; every
/// segment but the last must be a link or link list. Linking-objects
/// properties cannot be observed.
pub fn validate_key_path(
    path: &KeyPath,
    schema: &SchemaDescriptor,
    schemas: &dyn SchemaLookup,
) -> DiffResult<()> {
    let invalid = |reason: String| DiffError::InvalidKeyPath {
        path: path.to_string(),
        reason,
    };

    let mut current = None;
    let last = path.len() - 1;
    for (i, segment) in path.segments().iter().enumerate() {
        let class = current.as_deref().unwrap_or(schema);
        let prop = class.lookup(segment).ok_or_else(|| {
            invalid(format!(
                "class '{}' has no property '{segment}'",
                class.class_name()
            ))
        })?;
        if prop.is_linking_objects() {
            return Err(invalid(format!(
                "linking objects property '{segment}' cannot be observed"
            )));
        }
        if i == last {
            break;
        }
        if !prop.is_relationship() {
            return Err(invalid(format!("property '{segment}' is not a relationship")));
        }
        let target = prop.object_class.as_deref().unwrap_or_default();
        let next = schemas
            .schema_for_class(target)
            .ok_or_else(|| DiffError::UnknownClass(target.to_owned()))?;
        current = Some(next);
    }
    Ok(())
}
