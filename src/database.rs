use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{Result, DEFAULT_POOL_SIZE};
use crate::stats::TableStats;

/// The engine context: the catalog, the buffer pool, and the per-table
/// statistics map. A `Database` is constructed once per engine instance
/// and passed explicitly (as `Arc<Database>`) to files, operators and
/// tests; there is no process-global singleton.
pub struct Database {
    catalog: Catalog,
    buffer_pool: BufferPool,
    stats: RwLock<HashMap<String, Arc<TableStats>>>,
}

impl Database {
    /// Creates a database whose buffer pool caches up to `pool_capacity`
    /// pages.
    pub fn new(pool_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            catalog: Catalog::new(),
            buffer_pool: BufferPool::new(pool_capacity),
            stats: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a database with the default pool capacity.
    pub fn with_default_pool() -> Arc<Self> {
        Self::new(DEFAULT_POOL_SIZE)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Builds statistics for every table in the catalog.
    pub fn compute_statistics(self: &Arc<Self>) -> Result<()> {
        for table_id in self.catalog.table_ids() {
            let name = self.catalog.table_name(table_id)?;
            let stats = Arc::new(TableStats::build(self, table_id)?);
            self.stats.write().insert(name, stats);
        }
        Ok(())
    }

    /// Returns the statistics computed for the named table, if any.
    pub fn table_stats(&self, table_name: &str) -> Option<Arc<TableStats>> {
        self.stats.read().get(table_name).cloned()
    }

    /// Installs statistics for a table. Exposed for tests.
    pub fn set_table_stats(&self, table_name: impl Into<String>, stats: Arc<TableStats>) {
        self.stats.write().insert(table_name.into(), stats);
    }
}
