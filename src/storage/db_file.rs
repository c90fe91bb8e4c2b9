use std::sync::Arc;

use crate::common::{PageId, Result, TransactionId};
use crate::database::Database;
use crate::tuple::{Schema, Tuple};

/// A transactional scan over the tuples of a database file.
///
/// The protocol mirrors the operator pipeline: `next` may only be called
/// after `has_next` returned true, `rewind` restarts at the first tuple,
/// and `close` drops iteration state. Page locks taken while scanning are
/// held until the owning transaction completes, not until `close`.
pub trait FileIterator: Send {
    fn open(&mut self) -> Result<()>;
    fn has_next(&mut self) -> Result<bool>;
    fn next(&mut self) -> Result<Tuple>;
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);
}

/// The interface the engine expects from any on-disk table representation.
/// Heap files and B+ tree files both implement it; the buffer pool and the
/// operators are agnostic to which one backs a table.
pub trait DbFile: Send + Sync {
    /// The table id, stable for the file's lifetime.
    fn id(&self) -> u32;

    /// The schema shared by every tuple in the file.
    fn schema(&self) -> &Arc<Schema>;

    /// Number of pages currently backed by the file.
    fn num_pages(&self) -> Result<u32>;

    /// Positioned read of one page. Reads past the end of the file yield
    /// zeroed bytes.
    fn read_page(&self, pid: PageId) -> Result<Vec<u8>>;

    /// Positioned write of one page image.
    fn write_page(&self, pid: PageId, data: &[u8]) -> Result<()>;

    /// Inserts a tuple on behalf of `tid`, going through the buffer pool
    /// with exclusive access for every page it touches. Returns the ids of
    /// the pages it dirtied in the pool.
    fn insert_tuple(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>>;

    /// Deletes the tuple named by its record identity. Returns the ids of
    /// the pages it dirtied in the pool.
    fn delete_tuple(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>>;

    /// Opens a scan over every tuple in the file on behalf of `tid`.
    fn iterator(&self, db: Arc<Database>, tid: TransactionId) -> Box<dyn FileIterator>;
}
