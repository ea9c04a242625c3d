//! Session context: the open databases and the current cache.
//!
//! A session holds at most one identifier graph and one expression dataset.
//! Connecting either kind closes the previous connection of that kind and
//! discards the current cache; sessions are independent of each other.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cache::CachedData;
use crate::expression::ExpressionStore;
use crate::gdb::IdentifierGraphStore;
use crate::pipeline::{CachingHandle, CachingPipeline, PipelineError, RunState, SharedMapper};
use crate::storage::{Result, StorageBackend};
use crate::xref::Xref;

pub struct Session {
    backend: Arc<dyn StorageBackend>,
    gdb: Arc<Mutex<IdentifierGraphStore>>,
    gex: Arc<Mutex<ExpressionStore>>,
    pipeline: CachingPipeline,
    cache: RwLock<Arc<CachedData>>,
}

impl Session {
    /// Create a session with no open databases
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let gdb = Arc::new(Mutex::new(IdentifierGraphStore::disconnected()));
        let gex = Arc::new(Mutex::new(ExpressionStore::disconnected()));
        let mapper: SharedMapper = gdb.clone();
        Self {
            backend,
            pipeline: CachingPipeline::new(mapper, Arc::clone(&gex)),
            gdb,
            gex,
            cache: RwLock::new(Arc::new(CachedData::default())),
        }
    }

    /// Set the per-run hub memo capacity
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.pipeline.set_memo_capacity(capacity);
        self
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Open the identifier graph at `name`, closing the previous one.
    pub fn connect_gdb(&self, name: &Path) -> Result<()> {
        let mut gdb = self.gdb.lock();
        gdb.close()?;
        self.discard_cache();
        *gdb = IdentifierGraphStore::open(self.backend.as_ref(), name)?;
        Ok(())
    }

    /// Open the expression dataset at `name`, closing the previous one.
    pub fn connect_gex(&self, name: &Path) -> Result<()> {
        let mut gex = self.gex.lock();
        gex.close()?;
        self.discard_cache();
        *gex = ExpressionStore::open(self.backend.as_ref(), name)?;
        Ok(())
    }

    pub fn close_gdb(&self) -> Result<()> {
        self.discard_cache();
        self.gdb.lock().close()
    }

    pub fn close_gex(&self) -> Result<()> {
        self.discard_cache();
        self.gex.lock().close()
    }

    /// Close both databases and drop the cache.
    pub fn close(&self) -> Result<()> {
        self.close_gdb()?;
        self.close_gex()?;
        info!("Session closed");
        Ok(())
    }

    /// The identifier graph, locked for the caller
    pub fn gdb(&self) -> MutexGuard<'_, IdentifierGraphStore> {
        self.gdb.lock()
    }

    /// The expression dataset, locked for the caller
    pub fn gex(&self) -> MutexGuard<'_, ExpressionStore> {
        self.gex.lock()
    }

    /// Start a caching run. Its cache replaces the current one.
    pub fn start_caching(
        &self,
        identifiers: Vec<Xref>,
    ) -> std::result::Result<CachingHandle, PipelineError> {
        let handle = self.pipeline.start(identifiers)?;
        *self.cache.write() = handle.cache();
        Ok(handle)
    }

    /// Cache of the latest run (empty before the first run)
    pub fn cached_data(&self) -> Arc<CachedData> {
        Arc::clone(&self.cache.read())
    }

    pub fn caching_state(&self) -> RunState {
        self.pipeline.state()
    }

    fn discard_cache(&self) {
        *self.cache.write() = Arc::new(CachedData::default());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.gdb.lock().close();
        let _ = self.gex.lock().close();
    }
}
