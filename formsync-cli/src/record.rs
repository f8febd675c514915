//! Records and snapshots exchanged between nodes and the store
//!
//! A record is a JSON object keyed by column name. A snapshot is either a
//! single record (one-to-one slices, root forms) or an ordered list of rows
//! (one-to-many slices, join tables).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row, keyed by column name
pub type Record = Map<String, Value>;

/// Name of the identifier column every table carries
pub const ID_FIELD: &str = "id";

/// One table's data slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    /// Ordered rows
    Rows(Vec<Record>),
    /// A single record
    Record(Record),
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// An empty single record
    pub fn empty() -> Self {
        Snapshot::Record(Record::new())
    }

    /// Build a snapshot from a JSON value.
    ///
    /// Objects become a single record, arrays become rows (non-object
    /// elements are dropped). Anything else has no snapshot.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Snapshot::Record(map.clone())),
            Value::Array(items) => Some(Snapshot::Rows(
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Snapshot::Record(record) => Value::Object(record.clone()),
            Snapshot::Rows(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect())
            }
        }
    }

    pub fn is_rows(&self) -> bool {
        matches!(self, Snapshot::Rows(_))
    }

    /// True for a record without keys or an empty row list
    pub fn is_empty(&self) -> bool {
        match self {
            Snapshot::Record(record) => record.is_empty(),
            Snapshot::Rows(rows) => rows.is_empty(),
        }
    }

    /// The id of a single-record snapshot, if it has a non-empty one
    pub fn id(&self) -> Option<&Value> {
        match self {
            Snapshot::Record(record) => record.get(ID_FIELD).filter(|id| is_truthy(id)),
            Snapshot::Rows(_) => None,
        }
    }

    pub fn records(&self) -> std::slice::Iter<'_, Record> {
        match self {
            Snapshot::Record(record) => std::slice::from_ref(record).iter(),
            Snapshot::Rows(rows) => rows.iter(),
        }
    }

    pub fn records_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        match self {
            Snapshot::Record(record) => std::slice::from_mut(record).iter_mut(),
            Snapshot::Rows(rows) => rows.iter_mut(),
        }
    }

    /// Normalize to rows. An empty single record yields no rows.
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            Snapshot::Record(record) if record.is_empty() => Vec::new(),
            Snapshot::Record(record) => vec![record],
            Snapshot::Rows(rows) => rows,
        }
    }
}

/// Form-style truthiness: `null`, `false`, `0`, `""` count as empty
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The non-empty id of a record
pub fn record_id(record: &Record) -> Option<&Value> {
    record.get(ID_FIELD).filter(|id| is_truthy(id))
}

/// String form of an id, used as a key in result maps
///
/// Strings are used verbatim so placeholder ids round-trip; numbers and
/// other values use their JSON rendering.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
