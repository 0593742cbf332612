//! Dotted field paths and forgiving lookups into nested records.
//!
//! Every lookup failure (missing key, intermediate value that is not a
//! mapping, malformed path) resolves to "not found" instead of an error, so
//! rule authors do not need guards around optional data.

use std::fmt;
use serde_json::Value;

use crate::record::Record;

/// Represents a path to a field in a nested record
///
/// # Examples
///
/// - `name` - top-level field
/// - `address.city` - nested field
/// - `items.[0].sku` - first element of a sequence
/// - `meta.content-type` - hyphens (and any other non-dot character) are
///   part of the key name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments; empty when the path is empty or malformed
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal key name (e.g., "user", "1", "content-type")
    Field(String),
    /// A sequence index written as `[N]`
    Index(usize),
}

impl FieldPath {
    /// Parse a dot-separated path.
    ///
    /// A path with an empty segment (`"a..b"`, `".a"`, `""`) is kept but never
    /// resolves.
    ///
    /// # Example
    ///
    /// ```
    /// use recast::FieldPath;
    ///
    /// let path = FieldPath::from_dotted("user.address.city");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn from_dotted(path: &str) -> Self {
        let parts: Vec<&str> = path.split('.').collect();

        let segments = if parts.iter().any(|s| s.is_empty()) {
            Vec::new()
        } else {
            parts
                .into_iter()
                .map(|s| {
                    if s.starts_with('[') && s.ends_with(']') && s.len() > 2 {
                        if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                            return PathSegment::Index(index);
                        }
                    }
                    PathSegment::Field(s.to_string())
                })
                .collect()
        };

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Whether the path can ever resolve.
    pub fn is_valid(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Look up the value at this path.
    ///
    /// Returns `None` when the path does not resolve. A field that exists
    /// with a JSON `null` value resolves to `Some(&Value::Null)`.
    pub fn resolve<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = match first {
            PathSegment::Field(name) => record.get(name)?,
            PathSegment::Index(_) => return None,
        };

        for segment in rest {
            current = step(current, segment)?;
        }

        Some(current)
    }

    /// Mutable counterpart of [`FieldPath::resolve`].
    pub fn resolve_mut<'a>(&self, record: &'a mut Record) -> Option<&'a mut Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = match first {
            PathSegment::Field(name) => record.get_mut(name)?,
            PathSegment::Index(_) => return None,
        };

        for segment in rest {
            current = step_mut(current, segment)?;
        }

        Some(current)
    }

    /// Write `value` at this path.
    ///
    /// The leaf is created or overwritten, but no intermediate structure is
    /// created: if a parent along the path is missing (or not a container)
    /// nothing is written and `false` is returned.
    pub fn set(&self, record: &mut Record, value: Value) -> bool {
        let Some((leaf, parents)) = self.segments.split_last() else {
            return false;
        };

        if parents.is_empty() {
            return match leaf {
                PathSegment::Field(name) => {
                    record.insert(name.clone(), value);
                    true
                }
                PathSegment::Index(_) => false,
            };
        }

        let parent_path = FieldPath {
            raw: String::new(),
            segments: parents.to_vec(),
        };

        match (parent_path.resolve_mut(record), leaf) {
            (Some(Value::Object(map)), PathSegment::Field(name)) => {
                map.insert(name.clone(), value);
                true
            }
            (Some(Value::Array(items)), PathSegment::Index(index)) if *index < items.len() => {
                items[*index] = value;
                true
            }
            _ => false,
        }
    }
}

fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Field(name)) => map.get(name),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Field(name)) => map.get_mut(name),
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Resolve an optional dotted path against a record.
///
/// `None` or an empty path never resolves.
pub fn resolve<'a>(record: &'a Record, path: Option<&str>) -> Option<&'a Value> {
    path.and_then(|p| FieldPath::from_dotted(p).resolve(record))
}
