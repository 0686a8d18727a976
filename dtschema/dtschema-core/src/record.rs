//! Decoded structure records.

use std::{ops::Range, sync::Arc};

use indexmap::IndexMap;

use crate::value::Value;

/// Result of decoding one structure.
///
/// Fields appear in decode order. Fields skipped by a condition are absent,
/// as are padding members.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    name: Arc<str>,
    variant: Option<Arc<str>>,
    range: Range<usize>,
    fields: IndexMap<String, Value>,
}

impl DecodedRecord {
    pub fn new(name: impl Into<Arc<str>>, range: Range<usize>, fields: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            variant: None,
            range,
            fields,
        }
    }

    /// Tag the record with the structure-group variant it was decoded as.
    pub fn with_variant(mut self, variant: impl Into<Arc<str>>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Name of the structure (or structure-group) that produced the record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved variant name when decoded through a structure-group.
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Absolute byte range of the record within the decoded buffer.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Shift this record's range, and those of nested records, by `base`.
    pub fn rebase(&mut self, base: usize) {
        self.range = self.range.start + base..self.range.end + base;
        for value in self.fields.values_mut() {
            value.rebase(base);
        }
    }

    pub fn byte_size(&self) -> usize {
        self.range.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> IndexMap<String, Value> {
        self.fields
    }
}
