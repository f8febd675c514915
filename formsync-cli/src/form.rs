//! Form ingestion
//!
//! UI forms hand over flat field maps where nested slices use dotted keys
//! (`"org.name"`). [`groom`] turns such a map into the nested record a
//! root node expects as its new data.

use std::fmt;

use log::debug;
use serde_json::Value;

use crate::path::{DotPath, set_path};
use crate::record::Record;

/// Computes a field's value from all fields, given the field's key
pub type FieldTransform = Box<dyn Fn(&Record, &str) -> Value + Send + Sync>;

/// How raw form values are turned into a record
#[derive(Default)]
pub struct GroomOptions {
    /// Values used where the form has none, typically the original record
    pub defaults: Record,
    /// Applied in order; each sees the result of the previous ones
    pub transforms: Vec<(String, FieldTransform)>,
    /// Fields dropped before re-nesting
    pub remove: Vec<String>,
}

impl GroomOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_transform(
        mut self,
        field: impl Into<String>,
        transform: impl Fn(&Record, &str) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transforms.push((field.into(), Box::new(transform)));
        self
    }

    pub fn removing(mut self, field: impl Into<String>) -> Self {
        self.remove.push(field.into());
        self
    }
}

impl fmt::Debug for GroomOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroomOptions")
            .field("defaults", &self.defaults)
            .field(
                "transforms",
                &self.transforms.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("remove", &self.remove)
            .finish()
    }
}

/// Merge defaults with the form values, apply transforms, drop removed
/// fields and re-nest dotted keys into objects.
///
/// A dotted key merges into an existing object under its first segment.
/// Keys that are not valid paths (`"a..b"`) are kept verbatim.
pub fn groom(form_values: &Record, options: &GroomOptions) -> Record {
    let mut fields = options.defaults.clone();
    fields.extend(form_values.iter().map(|(k, v)| (k.clone(), v.clone())));

    for (key, transform) in &options.transforms {
        let value = transform(&fields, key);
        fields.insert(key.clone(), value);
    }

    for key in &options.remove {
        fields.remove(key);
    }

    let dotted: Vec<String> = fields.keys().filter(|k| k.contains('.')).cloned().collect();
    for key in dotted {
        let Ok(path) = DotPath::parse(&key) else {
            debug!("Keeping form field '{}' as-is: not a valid path", key);
            continue;
        };
        if let Some(value) = fields.remove(&key) {
            set_path(&mut fields, &path, value);
        }
    }

    fields
}
