//! Common test utilities for integration tests.
//!
//! Builds small identifier graphs and expression datasets on disk so tests
//! exercise the real backends end to end.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use pathdata_core::{
    DataSource, IdentifierGraphStore, ImportReport, ImportSettings, Importer, StorageBackend,
    Xref, SYMBOL_ATTRIBUTE,
};

/// Links written by [`build_gdb`]: (hub, leaf id, leaf code)
pub const LINKS: &[(&str, &str, &str)] = &[
    ("ENSG1", "GENE1", "L"),
    ("ENSG1", "P0001", "S"),
    ("ENSG1", "ENSG1", "En"),
    ("ENSG2", "GENE2", "L"),
    ("ENSG2", "P0002", "S"),
    ("ENSG3", "GENE3", "L"),
    ("ENSG4", "GENE2", "L"),
];

/// Workspace with a finalized identifier graph
pub struct Fixture {
    pub dir: TempDir,
    pub gdb: PathBuf,
}

impl Fixture {
    pub fn new(backend: &dyn StorageBackend) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let gdb = dir.path().join("genes.pgdb");
        build_gdb(backend, &gdb);
        Self { dir, gdb }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `content` to a file in the fixture directory
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).expect("Failed to write fixture file");
        path
    }

    /// Import `content` (tab-separated, Entrez ids) into `<name>.pgex`
    pub fn import(&self, backend: &dyn StorageBackend, name: &str, content: &str) -> ImportReport {
        let input = self.write(&format!("{name}.txt"), content);
        let target = self.path(&format!("{name}.pgex"));
        let gdb = IdentifierGraphStore::open(backend, &self.gdb).expect("Failed to open gdb");
        let report = Importer::new(&gdb, backend)
            .with_settings(ImportSettings {
                default_source: Some(DataSource::entrez()),
                ..ImportSettings::default()
            })
            .import_delimited(&input, &target)
            .expect("Import failed");
        report
    }
}

/// Build and finalize an identifier graph holding [`LINKS`]
pub fn build_gdb(backend: &dyn StorageBackend, path: &Path) {
    let gdb = IdentifierGraphStore::create(backend, path).expect("Failed to create gdb");
    for (hub, id, code) in LINKS {
        let hub = Xref::new(*hub, DataSource::ensembl());
        gdb.add_link(&hub, &Xref::new(*id, *code), None)
            .expect("Failed to add link");
    }
    let brca = Xref::new("ENSG1", DataSource::ensembl());
    gdb.add_datanode(&brca, Some("Breast cancer type 2 susceptibility protein"))
        .expect("Failed to add datanode");
    gdb.add_attribute(&brca, SYMBOL_ATTRIBUTE, "BRCA2")
        .expect("Failed to add attribute");
    gdb.finalize(backend).expect("Failed to finalize gdb");
}

pub fn entrez(id: &str) -> Xref {
    Xref::new(id, DataSource::entrez())
}
