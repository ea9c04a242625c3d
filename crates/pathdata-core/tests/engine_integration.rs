//! End-to-end tests for pathdata-core.
//!
//! These tests build real databases on disk and validate:
//! - Cross-reference resolution through hubs
//! - Import error isolation and the error report
//! - Caching runs: aggregation, isolation between runs, cancellation
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package pathdata-core --test engine_integration
//! ```

mod common;

use std::fs;
use std::sync::Arc;

use pathdata_core::{
    error_file_path, ArchiveBackend, BackendKind, CachingEvent, DataSource, IdMapper,
    IdentifierGraphStore, RunState, SampleValue, Session, SqliteBackend, StorageBackend,
    StorageError,
};

use common::{entrez, Fixture, LINKS};

// ============================================================================
// Test Helpers
// ============================================================================

fn session_for(fixture: &Fixture, backend: Arc<dyn StorageBackend>, gex: &str) -> Session {
    let session = Session::new(backend);
    session.connect_gdb(&fixture.gdb).expect("Failed to connect gdb");
    session
        .connect_gex(&fixture.path(gex))
        .expect("Failed to connect gex");
    session
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_resolution_round_trip_on_both_backends() {
    for kind in [BackendKind::Sqlite, BackendKind::Archive] {
        let backend = kind.create();
        let fixture = Fixture::new(backend.as_ref());
        let gdb = IdentifierGraphStore::open(backend.as_ref(), &fixture.gdb).unwrap();

        for (hub, id, code) in LINKS {
            let leaf = pathdata_core::Xref::new(*id, *code);
            let hubs = gdb.resolve_to_hub(&leaf).unwrap();
            assert!(hubs.contains(&hub.to_string()), "{kind}: {leaf} -> {hub}");

            let refs = gdb.cross_references(&leaf, None).unwrap();
            assert!(refs.contains(&leaf), "{kind}: {leaf} reachable from itself");
        }
    }
}

#[test]
fn test_cross_references_through_multiple_hubs() {
    let fixture = Fixture::new(&SqliteBackend);
    let gdb = IdentifierGraphStore::open(&SqliteBackend, &fixture.gdb).unwrap();

    // GENE2 hangs off ENSG2 and ENSG4
    let refs = gdb.cross_references(&entrez("GENE2"), None).unwrap();
    assert_eq!(refs.len(), 2);

    let uniprot = gdb
        .cross_references(&entrez("GENE1"), Some(&DataSource::uniprot()))
        .unwrap();
    assert_eq!(uniprot, vec![pathdata_core::Xref::new("P0001", "S")]);
}

#[test]
fn test_lookups_on_finalized_archive() {
    let fixture = Fixture::new(&ArchiveBackend);
    let gdb = IdentifierGraphStore::open(&ArchiveBackend, &fixture.gdb).unwrap();
    let hub = pathdata_core::Xref::new("ENSG1", DataSource::ensembl());

    assert!(gdb
        .backpage_text(&hub)
        .unwrap()
        .is_some_and(|text| text.contains("Breast cancer")));
    assert_eq!(
        gdb.symbol_suggestions("brc", 10, false).unwrap(),
        vec!["BRCA2".to_string()]
    );
    assert_eq!(gdb.free_text_search("susceptibility", 5).unwrap().len(), 1);
    assert_eq!(gdb.link_count().unwrap(), LINKS.len() as u64);
}

// ============================================================================
// Import
// ============================================================================

#[test]
fn test_unmapped_row_produces_one_error_and_no_values() {
    let fixture = Fixture::new(&SqliteBackend);
    let report = fixture.import(
        &SqliteBackend,
        "data",
        "id\ts1\nGENE1\t1\nGENE_UNKNOWN\t2\n",
    );

    assert_eq!(report.rows_read, 2);
    assert_eq!(report.rows_added, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.expression_rows, 1);

    let log = fs::read_to_string(error_file_path(&fixture.path("data.pgex"))).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("GENE_UNKNOWN"));
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn test_three_row_scenario() {
    let backend: Arc<dyn StorageBackend> = Arc::new(ArchiveBackend);
    let fixture = Fixture::new(backend.as_ref());
    let report = fixture.import(
        backend.as_ref(),
        "scenario",
        "id\tcontrol\ttreated\nGENE1\t1.0\t2.0\nGENE3\t3.0\t4.0\nGENE_UNKNOWN\t5\t6\n",
    );
    assert_eq!(report.rows_added, 2);

    let session = session_for(&fixture, backend, "scenario.pgex");
    let handle = session.start_caching(vec![entrez("GENE1")]).unwrap();
    let summary = handle.wait().unwrap();
    assert_eq!(summary.state, RunState::Completed);

    let cache = session.cached_data();
    let records = cache.get(&entrez("GENE1")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sample_data(0), Some(&SampleValue::Numeric(1.0)));
    assert_eq!(records[0].sample_data(1), Some(&SampleValue::Numeric(2.0)));
    assert!(!cache.has_data(&entrez("GENE_UNKNOWN")));
}

#[test]
fn test_duplicate_reporters_are_averaged() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(
        backend.as_ref(),
        "dups",
        "id\tlevel\tcall\nGENE1\t1\tup\nGENE1\tNA\tflat\nGENE1\t5\tdown\n",
    );

    let session = session_for(&fixture, backend, "dups.pgex");
    session
        .start_caching(vec![entrez("GENE1")])
        .unwrap()
        .wait()
        .unwrap();

    let cache = session.cached_data();
    let gene1 = entrez("GENE1");
    assert!(cache.has_multiple_data(&gene1));

    // "NA" makes the column text-typed during sniffing
    let averaged = cache.average(&gene1).unwrap();
    assert_eq!(averaged[&0], SampleValue::Text("1, NA, 5".to_string()));
    assert_eq!(averaged[&1], SampleValue::Text("up, flat, down".to_string()));
}

#[test]
fn test_numeric_average_skips_nan() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(
        backend.as_ref(),
        "nan",
        "id\tlevel\nGENE1\t2\nGENE1\t\nGENE1\t4\nGENE3\t\n",
    );

    let session = session_for(&fixture, backend, "nan.pgex");
    session
        .start_caching(vec![entrez("GENE1"), entrez("GENE3")])
        .unwrap()
        .wait()
        .unwrap();

    let cache = session.cached_data();
    assert_eq!(
        cache.average(&entrez("GENE1")).unwrap()[&0],
        SampleValue::Numeric(3.0)
    );
    // Only empty values: the key stays, holding NaN
    let gene3 = cache.average(&entrez("GENE3")).unwrap();
    assert!(gene3[&0].is_nan());
}

#[test]
fn test_sequential_runs_do_not_leak_entries() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(
        backend.as_ref(),
        "iso",
        "id\ts1\nGENE1\t1\nGENE2\t2\nGENE3\t3\n",
    );
    let session = session_for(&fixture, backend, "iso.pgex");

    session
        .start_caching(vec![entrez("GENE1"), entrez("GENE2")])
        .unwrap()
        .wait()
        .unwrap();
    let first = session.cached_data();
    assert_eq!(first.len(), 2);

    session
        .start_caching(vec![entrez("GENE3")])
        .unwrap()
        .wait()
        .unwrap();
    let second = session.cached_data();
    assert_eq!(second.keys(), vec![entrez("GENE3")]);
    assert!(!second.has_data(&entrez("GENE1")));

    // The first run's cache is untouched by the second
    assert_eq!(first.len(), 2);
}

#[test]
fn test_small_hub_memo_still_caches_everything() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(backend.as_ref(), "memo", "id\ts1\nGENE1\t1\nGENE2\t2\n");

    let session = Session::new(Arc::clone(&backend)).with_memo_capacity(1);
    session.connect_gdb(&fixture.gdb).unwrap();
    session.connect_gex(&fixture.path("memo.pgex")).unwrap();

    let ids = vec![entrez("GENE1"), entrez("GENE2"), entrez("GENE1")];
    let summary = session.start_caching(ids).unwrap().wait().unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.processed, 3);

    let cache = session.cached_data();
    assert!(cache.has_data(&entrez("GENE1")));
    assert!(cache.has_data(&entrez("GENE2")));
}

#[test]
fn test_cancel_mid_run() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(backend.as_ref(), "cancel", "id\ts1\nGENE1\t1\nGENE2\t2\n");
    let session = session_for(&fixture, backend, "cancel.pgex");

    let identifiers: Vec<_> = (0..500)
        .map(|i| entrez(&format!("GENE{}", i % 3 + 1)))
        .collect();

    // Holding the graph parks the worker before or inside its first resolution
    let gdb = session.gdb();
    let handle = session.start_caching(identifiers).unwrap();
    handle.cancel();
    drop(gdb);

    let events: Vec<_> = handle.events().iter().collect();
    let summary = handle.wait().unwrap();
    assert_eq!(summary.state, RunState::Cancelled);
    assert!(summary.processed <= 1);
    assert_eq!(summary.total, 500);
    assert_eq!(session.caching_state(), RunState::Cancelled);

    let progress = events
        .iter()
        .filter(|event| matches!(event, CachingEvent::Progress { .. }))
        .count();
    assert_eq!(progress, summary.processed);
    assert!(matches!(events.last(), Some(CachingEvent::Finished(_))));
}

#[test]
fn test_connect_replaces_and_discards_cache() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend);
    let fixture = Fixture::new(backend.as_ref());
    fixture.import(backend.as_ref(), "a", "id\ts1\nGENE1\t1\n");
    fixture.import(backend.as_ref(), "b", "id\ts1\nGENE2\t2\n");
    let session = session_for(&fixture, backend, "a.pgex");

    session
        .start_caching(vec![entrez("GENE1")])
        .unwrap()
        .wait()
        .unwrap();
    assert!(session.cached_data().has_data(&entrez("GENE1")));

    session.connect_gex(&fixture.path("b.pgex")).unwrap();
    assert!(session.cached_data().is_empty());
    assert_eq!(session.gex().hub_ids(10).unwrap(), vec!["ENSG2", "ENSG4"]);

    // A failed connect leaves the session disconnected, not half-open
    let missing = session.connect_gex(&fixture.path("missing.pgex"));
    assert!(matches!(missing, Err(StorageError::DatabaseMissing { .. })));
    assert!(!session.gex().is_connected());

    session.close().unwrap();
    assert!(!session.gdb().is_connected());
}
