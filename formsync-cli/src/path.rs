//! Dot-separated key paths into nested records
//!
//! Nested form data addresses related slices with paths like
//! `"profile.address"`. These helpers read, remove and write values at such
//! paths without touching anything else in the record.

use std::fmt;

use serde_json::{Map, Value};

use crate::record::Record;

/// A parsed dot path, e.g. `org` or `profile.address`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DotPath {
    segments: Vec<String>,
}

impl DotPath {
    /// Parse a dot path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self, String> {
        if path.is_empty() {
            return Err("Path cannot be empty".to_string());
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("Path '{}' contains an empty segment", path));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment: the top-level key the path lives under
    pub fn root(&self) -> &str {
        &self.segments[0]
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Read the value at `path`
pub fn get_path<'a>(record: &'a Record, path: &DotPath) -> Option<&'a Value> {
    let (first, rest) = path.segments.split_first()?;
    let mut current = record.get(first)?;
    for segment in rest {
        current = current.get(segment.as_str())?;
    }
    Some(current)
}

/// Mutable access to the value at `path`
pub fn get_path_mut<'a>(record: &'a mut Record, path: &DotPath) -> Option<&'a mut Value> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = record;
    for segment in parents {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    current.get_mut(last)
}

/// Remove and return the value at `path`. Missing intermediate objects are a no-op.
pub fn remove_path(record: &mut Record, path: &DotPath) -> Option<Value> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = record;
    for segment in parents {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    current.remove(last)
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Intermediate values that are not objects are replaced.
pub fn set_path(record: &mut Record, path: &DotPath, value: Value) {
    let Some((last, parents)) = path.segments.split_last() else {
        return;
    };
    let mut current = record;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Some(next) = slot.as_object_mut() else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}
