//! Aggregation cache of expression records per pathway identifier.
//!
//! Built fresh by every caching run and then queried read-only. Keys are
//! only present when at least one record was found for them.
//!
//! Thread-safe: backed by a `DashMap`, so a renderer may read entries while
//! a run is still populating others.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::expression::{ExpressionRecord, SampleCatalog, SampleValue, ValueType};
use crate::xref::Xref;

/// Separator used when averaging text samples
pub const TEXT_JOIN_SEPARATOR: &str = ", ";

/// Records per pathway identifier plus the catalog used to average them
#[derive(Debug, Default)]
pub struct CachedData {
    entries: DashMap<Xref, Arc<[ExpressionRecord]>>,
    samples: Arc<SampleCatalog>,
}

impl CachedData {
    /// Create an empty cache for a dataset with `samples`
    pub fn new(samples: Arc<SampleCatalog>) -> Self {
        Self {
            entries: DashMap::new(),
            samples,
        }
    }

    pub fn samples(&self) -> &SampleCatalog {
        &self.samples
    }

    /// Store the records of `pathway_ref`, replacing any previous list.
    ///
    /// An empty list removes the key.
    pub fn populate(&self, pathway_ref: Xref, records: Vec<ExpressionRecord>) {
        if records.is_empty() {
            self.entries.remove(&pathway_ref);
        } else {
            self.entries.insert(pathway_ref, records.into());
        }
    }

    pub fn has_data(&self, pathway_ref: &Xref) -> bool {
        self.entries.contains_key(pathway_ref)
    }

    /// True when more than one reporter matched `pathway_ref`
    pub fn has_multiple_data(&self, pathway_ref: &Xref) -> bool {
        self.entries
            .get(pathway_ref)
            .is_some_and(|records| records.len() > 1)
    }

    /// Records of `pathway_ref`, if any
    pub fn get(&self, pathway_ref: &Xref) -> Option<Arc<[ExpressionRecord]>> {
        self.entries.get(pathway_ref).map(|e| Arc::clone(e.value()))
    }

    /// One representative value per declared sample.
    ///
    /// Numeric samples average their non-NaN values, or NaN when there are
    /// none. Text samples join every value with `", "` in record order.
    /// Every declared sample has a key, even when its value is NaN.
    pub fn average(&self, pathway_ref: &Xref) -> Option<BTreeMap<i32, SampleValue>> {
        let records = self.get(pathway_ref)?;
        let averaged = self
            .samples
            .iter()
            .map(|sample| {
                let value = match sample.value_type {
                    ValueType::Numeric => average_numeric(&records, sample.id),
                    ValueType::Text => join_text(&records, sample.id),
                };
                (sample.id, value)
            })
            .collect();
        Some(averaged)
    }

    /// Number of cached identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached identifiers, sorted
    pub fn keys(&self) -> Vec<Xref> {
        let mut keys: Vec<Xref> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

fn average_numeric(records: &[ExpressionRecord], sample_id: i32) -> SampleValue {
    let (sum, count) = records
        .iter()
        .filter_map(|r| r.sample_data(sample_id).and_then(SampleValue::as_f64))
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        SampleValue::Numeric(f64::NAN)
    } else {
        SampleValue::Numeric(sum / count as f64)
    }
}

fn join_text(records: &[ExpressionRecord], sample_id: i32) -> SampleValue {
    let parts: Vec<String> = records
        .iter()
        .filter_map(|r| r.sample_data(sample_id))
        .map(ToString::to_string)
        .collect();
    SampleValue::Text(parts.join(TEXT_JOIN_SEPARATOR))
}
