//! Expression records: one reporter's measurements across samples.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::samples::ValueType;
use crate::xref::Xref;

/// A single measured value
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Numeric(f64),
    Text(String),
}

impl SampleValue {
    /// Coerce a stored raw value according to the sample type.
    ///
    /// Numeric samples that do not parse become NaN rather than errors.
    pub fn coerce(raw: &str, value_type: ValueType) -> Self {
        match value_type {
            ValueType::Numeric => {
                SampleValue::Numeric(raw.trim().parse::<f64>().unwrap_or(f64::NAN))
            }
            ValueType::Text => SampleValue::Text(raw.to_string()),
        }
    }

    /// Numeric value, if this is a numeric sample
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Numeric(v) => Some(*v),
            SampleValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SampleValue::Text(s) => Some(s),
            SampleValue::Numeric(_) => None,
        }
    }

    /// True for numeric NaN
    pub fn is_nan(&self) -> bool {
        matches!(self, SampleValue::Numeric(v) if v.is_nan())
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Numeric(v) => write!(f, "{v}"),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for SampleValue {
    /// NaN has no JSON form; it serializes as `null`.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SampleValue::Numeric(v) if v.is_nan() => serializer.serialize_none(),
            SampleValue::Numeric(v) => serializer.serialize_f64(*v),
            SampleValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One reporter's values, keyed by sample id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionRecord {
    reporter: Xref,
    group_id: i64,
    values: BTreeMap<i32, SampleValue>,
}

impl ExpressionRecord {
    pub fn new(reporter: Xref, group_id: i64) -> Self {
        Self {
            reporter,
            group_id,
            values: BTreeMap::new(),
        }
    }

    pub fn reporter(&self) -> &Xref {
        &self.reporter
    }

    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    /// Set the value of one sample, replacing any previous value.
    pub fn set_sample_data(&mut self, sample_id: i32, value: SampleValue) {
        self.values.insert(sample_id, value);
    }

    pub fn sample_data(&self, sample_id: i32) -> Option<&SampleValue> {
        self.values.get(&sample_id)
    }

    /// All values in sample id order
    pub fn values(&self) -> &BTreeMap<i32, SampleValue> {
        &self.values
    }

    pub fn with_value(mut self, sample_id: i32, value: SampleValue) -> Self {
        self.set_sample_data(sample_id, value);
        self
    }
}
