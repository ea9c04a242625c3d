//! Sample catalog: the declared columns of an expression dataset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::MAX_NAME_LENGTH;

/// Kind of values a sample holds.
///
/// The discriminants are the `dataType` codes stored in the `samples` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text = 1,
    Numeric = 7,
}

impl ValueType {
    /// Code stored in `samples.dataType`
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Decode a stored `dataType`. Anything but the numeric code is text.
    pub fn from_code(code: i64) -> Self {
        if code == ValueType::Numeric as i64 {
            ValueType::Numeric
        } else {
            ValueType::Text
        }
    }
}

/// A declared sample column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i32,
    pub name: String,
    pub value_type: ValueType,
}

impl Sample {
    /// Create a sample, truncating `name` to the stored maximum length.
    pub fn new(id: i32, name: impl AsRef<str>, value_type: ValueType) -> Self {
        Self {
            id,
            name: truncate_name(name.as_ref()),
            value_type,
        }
    }
}

/// Truncate to [`MAX_NAME_LENGTH`] characters (not bytes).
pub fn truncate_name(name: &str) -> String {
    match name.char_indices().nth(MAX_NAME_LENGTH) {
        Some((byte_idx, _)) => name[..byte_idx].to_string(),
        None => name.to_string(),
    }
}

/// Samples of one dataset, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleCatalog {
    samples: BTreeMap<i32, Sample>,
}

impl SampleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a sample.
    pub fn insert(&mut self, sample: Sample) {
        self.samples.insert(sample.id, sample);
    }

    pub fn get(&self, id: i32) -> Option<&Sample> {
        self.samples.get(&id)
    }

    /// Value type of sample `id`, if declared
    pub fn value_type(&self, id: i32) -> Option<ValueType> {
        self.samples.get(&id).map(|s| s.value_type)
    }

    /// Samples in id order
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl FromIterator<Sample> for SampleCatalog {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut catalog = SampleCatalog::new();
        for sample in iter {
            catalog.insert(sample);
        }
        catalog
    }
}
