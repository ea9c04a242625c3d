//! Cross-Reference Resolution
//!
//! Identifiers are mapped through a hub namespace: every link is a directed
//! edge `hub -> leaf`. Translating between two leaf identifiers takes two
//! hops, first backwards to the hubs, then forwards to their leaves.
//!
//! ```text
//!   leaf (L:1234) ──reverse──▶ hub (ENSG01) ──forward──▶ leaf (S:P0123)
//!                                          └─forward──▶ leaf (L:1234)
//! ```
//!
//! [`IdMapper`] captures the two primitive lookups and derives the two-hop
//! join from them. [`LinkIndex`] is the in-memory implementation; the
//! SQLite-backed one lives in [`crate::gdb`].

use std::collections::{HashMap, HashSet};

use crate::storage::StorageError;
use crate::xref::{DataSource, Xref};

/// Source of cross-reference links.
///
/// "No mapping" is an empty result, never an error. Errors are reserved for
/// storage failures.
pub trait IdMapper {
    /// Hub identifiers linked to `xref` (reverse edges).
    fn resolve_to_hub(&self, xref: &Xref) -> Result<Vec<String>, StorageError>;

    /// Leaves linked from `hub` (forward edges), optionally restricted to
    /// one data source.
    fn hub_leaves(
        &self,
        hub: &str,
        filter: Option<&DataSource>,
    ) -> Result<Vec<Xref>, StorageError>;

    /// All identifiers reachable from `xref` through any of its hubs.
    ///
    /// The result is deduplicated, ordered by hub then by leaf, and may
    /// contain `xref` itself.
    fn cross_references(
        &self,
        xref: &Xref,
        filter: Option<&DataSource>,
    ) -> Result<Vec<Xref>, StorageError> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for hub in self.resolve_to_hub(xref)? {
            for leaf in self.hub_leaves(&hub, filter)? {
                if seen.insert(leaf.clone()) {
                    result.push(leaf);
                }
            }
        }
        Ok(result)
    }
}

impl<T: IdMapper + ?Sized> IdMapper for &T {
    fn resolve_to_hub(&self, xref: &Xref) -> Result<Vec<String>, StorageError> {
        (**self).resolve_to_hub(xref)
    }

    fn hub_leaves(
        &self,
        hub: &str,
        filter: Option<&DataSource>,
    ) -> Result<Vec<Xref>, StorageError> {
        (**self).hub_leaves(hub, filter)
    }
}

/// In-memory link graph indexed in both directions.
#[derive(Debug, Default, Clone)]
pub struct LinkIndex {
    /// Leaves indexed by hub identifier (forward edges)
    by_hub: HashMap<String, Vec<Xref>>,
    /// Hubs indexed by leaf (reverse edges)
    by_leaf: HashMap<Xref, Vec<String>>,
}

impl LinkIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `hub -> leaf` link. Duplicate links are ignored.
    pub fn add(&mut self, hub: impl Into<String>, leaf: Xref) -> bool {
        let hub = hub.into();
        let hubs = self.by_leaf.entry(leaf.clone()).or_default();
        if hubs.contains(&hub) {
            return false;
        }
        hubs.push(hub.clone());
        self.by_hub.entry(hub).or_default().push(leaf);
        true
    }

    /// Add multiple links
    pub fn add_all(&mut self, links: impl IntoIterator<Item = (String, Xref)>) {
        for (hub, leaf) in links {
            self.add(hub, leaf);
        }
    }

    /// Total number of links
    pub fn len(&self) -> usize {
        self.by_hub.values().map(|v| v.len()).sum()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.by_hub.is_empty()
    }

    /// Number of distinct hubs
    pub fn hub_count(&self) -> usize {
        self.by_hub.len()
    }

    /// Clear all links
    pub fn clear(&mut self) {
        self.by_hub.clear();
        self.by_leaf.clear();
    }
}

impl IdMapper for LinkIndex {
    fn resolve_to_hub(&self, xref: &Xref) -> Result<Vec<String>, StorageError> {
        Ok(self.by_leaf.get(xref).cloned().unwrap_or_default())
    }

    fn hub_leaves(
        &self,
        hub: &str,
        filter: Option<&DataSource>,
    ) -> Result<Vec<Xref>, StorageError> {
        let leaves = self.by_hub.get(hub).map(Vec::as_slice).unwrap_or_default();
        Ok(leaves
            .iter()
            .filter(|leaf| filter.is_none_or(|source| leaf.source() == source))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_index() -> LinkIndex {
        let mut index = LinkIndex::new();
        index.add("ENSG1", Xref::new("1234", "L"));
        index.add("ENSG1", Xref::new("P01", "S"));
        index.add("ENSG1", Xref::new("ENSG1", "En"));
        index.add("ENSG2", Xref::new("1234", "L"));
        index.add("ENSG2", Xref::new("P02", "S"));
        index
    }

    #[test]
    fn test_resolve_to_hub() {
        let index = sample_index();
        assert_eq!(
            index.resolve_to_hub(&Xref::new("1234", "L")).unwrap(),
            vec!["ENSG1".to_string(), "ENSG2".to_string()]
        );
        assert!(index
            .resolve_to_hub(&Xref::new("9999", "L"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cross_references_union_over_hubs() {
        let index = sample_index();
        let refs = index
            .cross_references(&Xref::new("1234", "L"), None)
            .unwrap();

        // 1234 appears under both hubs but only once in the result
        assert_eq!(
            refs,
            vec![
                Xref::new("1234", "L"),
                Xref::new("P01", "S"),
                Xref::new("ENSG1", "En"),
                Xref::new("P02", "S"),
            ]
        );
    }

    #[test]
    fn test_cross_references_filtered() {
        let index = sample_index();
        let refs = index
            .cross_references(&Xref::new("1234", "L"), Some(&DataSource::uniprot()))
            .unwrap();
        assert_eq!(refs, vec![Xref::new("P01", "S"), Xref::new("P02", "S")]);
    }

    #[test]
    fn test_duplicate_links_ignored() {
        let mut index = LinkIndex::new();
        assert!(index.add("ENSG1", Xref::new("1234", "L")));
        assert!(!index.add("ENSG1", Xref::new("1234", "L")));
        assert_eq!(index.len(), 1);
        assert_eq!(index.hub_count(), 1);

        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_mapper_through_reference() {
        let index = sample_index();
        let mapper: &dyn IdMapper = &index;
        assert_eq!(
            (&mapper)
                .resolve_to_hub(&Xref::new("P02", "S"))
                .unwrap(),
            vec!["ENSG2".to_string()]
        );
    }
}
