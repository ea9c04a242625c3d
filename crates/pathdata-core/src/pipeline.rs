//! Background caching runs.
//!
//! A run takes a list of pathway identifiers and, one at a time, resolves
//! each to hub ids, fetches the hub rows from the expression store, merges
//! them per group and populates a fresh [`CachedData`].
//!
//! ```text
//! Idle ──start()──▶ Running ──▶ Completed
//!                          ├──▶ Cancelled   (token set between identifiers)
//!                          └──▶ Failed      (expression store error)
//! ```
//!
//! At most one run is active per pipeline; a second `start` while running
//! is rejected. Progress and completion are delivered on a channel owned by
//! the returned [`CachingHandle`].

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CachedData;
use crate::cancel::CancellationToken;
use crate::expression::{merge_by_group, ExpressionStore, RawExpressionRow};
use crate::mapper::IdMapper;
use crate::storage::StorageError;
use crate::xref::Xref;

/// Default number of memoized hub resolutions per run
pub const DEFAULT_HUB_MEMO_CAPACITY: usize = 4096;

/// Identifier mapper shared between a session and its runs
pub type SharedMapper = Arc<Mutex<dyn IdMapper + Send>>;

/// Errors starting or joining a caching run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a caching run is already active")]
    AlreadyRunning,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to spawn caching worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("caching worker panicked")]
    WorkerPanicked,
}

/// Lifecycle of a caching run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

impl RunState {
    /// True for Completed, Cancelled and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed(_)
        )
    }
}

/// Counters of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Identifiers fully processed
    pub processed: usize,
    /// Total identifiers submitted
    pub total: usize,
    /// Identifiers that produced at least one record
    pub with_data: usize,
    /// Identifiers with no hub mapping
    pub unmapped: usize,
    /// Identifiers whose hub resolution failed
    pub resolution_failures: usize,
    pub state: RunState,
}

/// Notifications sent by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum CachingEvent {
    /// Sent after each identifier, whether or not it produced data
    Progress { processed: usize, total: usize },
    /// Last event of every run
    Finished(RunSummary),
}

impl CachingEvent {
    /// Progress as a fraction in `0.0..=1.0`
    pub fn fraction(&self) -> Option<f64> {
        match self {
            CachingEvent::Progress { processed, total } if *total > 0 => {
                Some(*processed as f64 / *total as f64)
            }
            CachingEvent::Progress { .. } => Some(1.0),
            CachingEvent::Finished(_) => None,
        }
    }
}

/// Runs caching jobs against one mapper and one expression store
pub struct CachingPipeline {
    mapper: SharedMapper,
    store: Arc<Mutex<ExpressionStore>>,
    memo_capacity: NonZeroUsize,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
}

impl CachingPipeline {
    pub fn new(mapper: SharedMapper, store: Arc<Mutex<ExpressionStore>>) -> Self {
        Self {
            mapper,
            store,
            memo_capacity: NonZeroUsize::new(DEFAULT_HUB_MEMO_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    /// Set the hub resolution memo capacity (minimum 1)
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.set_memo_capacity(capacity);
        self
    }

    /// Applies to runs started after the call
    pub fn set_memo_capacity(&mut self, capacity: usize) {
        self.memo_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    }

    /// State of the latest run
    pub fn state(&self) -> RunState {
        self.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run with a fresh cancellation token.
    pub fn start(&self, identifiers: Vec<Xref>) -> Result<CachingHandle, PipelineError> {
        self.start_with_token(identifiers, CancellationToken::new())
    }

    /// Start a run that stops once `token` is cancelled.
    pub fn start_with_token(
        &self,
        identifiers: Vec<Xref>,
        token: CancellationToken,
    ) -> Result<CachingHandle, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let guard = RunGuard {
            running: Arc::clone(&self.running),
        };

        let cache = Arc::new(CachedData::new(self.store.lock().samples()));
        *self.state.lock() = RunState::Running;

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            mapper: Arc::clone(&self.mapper),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&cache),
            memo: LruCache::new(self.memo_capacity),
            token: token.clone(),
            events: tx,
            state: Arc::clone(&self.state),
        };

        info!("Starting caching run for {} identifier(s)", identifiers.len());
        let spawned = thread::Builder::new()
            .name("pathdata-caching".to_string())
            .spawn(move || {
                let _guard = guard;
                worker.run(identifiers)
            });

        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                *self.state.lock() = RunState::Failed(err.to_string());
                return Err(PipelineError::Spawn(err));
            }
        };

        Ok(CachingHandle {
            token,
            events: rx,
            cache,
            join,
        })
    }
}

/// Clears the running flag when the worker exits, even by panic.
struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Caller side of a running job
pub struct CachingHandle {
    token: CancellationToken,
    events: Receiver<CachingEvent>,
    cache: Arc<CachedData>,
    join: JoinHandle<RunSummary>,
}

impl CachingHandle {
    /// Request cancellation; takes effect at the next identifier boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Progress and completion events
    pub fn events(&self) -> &Receiver<CachingEvent> {
        &self.events
    }

    /// The cache this run populates
    pub fn cache(&self) -> Arc<CachedData> {
        Arc::clone(&self.cache)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the worker exits and return its summary.
    pub fn wait(self) -> Result<RunSummary, PipelineError> {
        self.join.join().map_err(|_| PipelineError::WorkerPanicked)
    }
}

struct Worker {
    mapper: SharedMapper,
    store: Arc<Mutex<ExpressionStore>>,
    cache: Arc<CachedData>,
    memo: LruCache<Xref, Arc<[String]>>,
    token: CancellationToken,
    events: Sender<CachingEvent>,
    state: Arc<Mutex<RunState>>,
}

impl Worker {
    fn run(mut self, identifiers: Vec<Xref>) -> RunSummary {
        let total = identifiers.len();
        let mut summary = RunSummary {
            processed: 0,
            total,
            with_data: 0,
            unmapped: 0,
            resolution_failures: 0,
            state: RunState::Running,
        };

        for xref in &identifiers {
            if self.token.is_cancelled() {
                info!(
                    "Caching run cancelled after {}/{} identifier(s)",
                    summary.processed, total
                );
                summary.state = RunState::Cancelled;
                break;
            }

            match self.process(xref) {
                Ok(Outcome::Cached) => summary.with_data += 1,
                Ok(Outcome::NoData) => {}
                Ok(Outcome::Unmapped) => summary.unmapped += 1,
                Ok(Outcome::ResolutionFailed) => summary.resolution_failures += 1,
                Err(err) => {
                    warn!("Caching run failed at {}: {}", xref, err);
                    summary.state = RunState::Failed(err.to_string());
                    break;
                }
            }

            summary.processed += 1;
            // Receiver may be gone; the run still completes
            let _ = self.events.send(CachingEvent::Progress {
                processed: summary.processed,
                total,
            });
        }

        if summary.state == RunState::Running {
            summary.state = RunState::Completed;
            info!(
                "Caching run completed: {} identifier(s), {} with data, {} unmapped",
                summary.processed, summary.with_data, summary.unmapped
            );
        }

        *self.state.lock() = summary.state.clone();
        let _ = self.events.send(CachingEvent::Finished(summary.clone()));
        summary
    }

    fn process(&mut self, xref: &Xref) -> Result<Outcome, StorageError> {
        let hubs = match self.resolve(xref) {
            Ok(hubs) => hubs,
            Err(err) => {
                warn!("Failed to resolve {}: {}", xref, err);
                return Ok(Outcome::ResolutionFailed);
            }
        };
        if hubs.is_empty() {
            debug!("{} has no hub mapping", xref);
            return Ok(Outcome::Unmapped);
        }

        let store = self.store.lock();
        let mut rows: Vec<RawExpressionRow> = Vec::new();
        for hub in hubs.iter() {
            rows.extend(store.query_by_hub(hub)?);
        }
        let samples = store.samples();
        drop(store);

        let records = merge_by_group(rows, &samples);
        if records.is_empty() {
            return Ok(Outcome::NoData);
        }
        debug!("{} cached with {} record(s)", xref, records.len());
        self.cache.populate(xref.clone(), records);
        Ok(Outcome::Cached)
    }

    fn resolve(&mut self, xref: &Xref) -> Result<Arc<[String]>, StorageError> {
        if let Some(hubs) = self.memo.get(xref) {
            return Ok(Arc::clone(hubs));
        }
        let hubs: Arc<[String]> = self.mapper.lock().resolve_to_hub(xref)?.into();
        self.memo.put(xref.clone(), Arc::clone(&hubs));
        Ok(hubs)
    }
}

enum Outcome {
    Cached,
    NoData,
    Unmapped,
    ResolutionFailed,
}
