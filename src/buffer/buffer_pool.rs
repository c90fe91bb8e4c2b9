//! The buffer pool: a bounded cache of page images with LRU eviction,
//! page-level locking, and transactional flush/discard at completion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{DbError, PageId, Result, TransactionId};
use crate::concurrency::{LockManager, LockMode};
use crate::database::Database;
use crate::tuple::Tuple;

/// Requested access level for a page. Maps one-to-one onto lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    ReadOnly,
    ReadWrite,
}

impl Perm {
    fn lock_mode(self) -> LockMode {
        match self {
            Perm::ReadOnly => LockMode::Shared,
            Perm::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// One cached page image.
struct Frame {
    data: Vec<u8>,
    /// The transaction that dirtied the page since its last flush, if any.
    dirtier: Option<TransactionId>,
    /// Last-access stamp; smaller means older.
    stamp: u64,
}

struct PoolState {
    frames: HashMap<PageId, Frame>,
    stamp: u64,
}

impl PoolState {
    fn bump_stamp(&mut self) -> u64 {
        if self.stamp == u64::MAX {
            // One-time reset at saturation: every cached page restarts at 1.
            self.stamp = 1;
            for frame in self.frames.values_mut() {
                frame.stamp = 1;
            }
        }
        self.stamp += 1;
        self.stamp
    }

    /// Evicts the clean page with the minimum stamp. Dirty pages must never
    /// be evicted; abort correctness depends on it (NO-STEAL, no WAL).
    fn evict_one(&mut self) -> Result<()> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirtier.is_none())
            .min_by_key(|(_, frame)| frame.stamp)
            .map(|(&pid, _)| pid)
            .ok_or(DbError::NoEvictablePage)?;
        self.frames.remove(&victim);
        Ok(())
    }
}

/// Caches up to `capacity` page images keyed by page id. Every access goes
/// through the lock manager first, so a returned image is stable for as
/// long as the transaction's lock protects it.
pub struct BufferPool {
    capacity: usize,
    state: Mutex<PoolState>,
    lock_manager: LockManager,
}

impl BufferPool {
    /// Creates a buffer pool that caches up to `capacity` pages.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be positive");
        Self {
            capacity,
            state: Mutex::new(PoolState {
                frames: HashMap::new(),
                stamp: 0,
            }),
            lock_manager: LockManager::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The universal page accessor. Acquires the lock implied by `perm`
    /// (blocking, or failing with `Abort` as a deadlock victim), then
    /// returns a copy of the cached image, reading it from the backing
    /// file on a miss and evicting one clean page if the pool is full.
    pub fn get_page(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        pid: PageId,
        perm: Perm,
    ) -> Result<Vec<u8>> {
        self.lock_manager.acquire(tid, pid, perm.lock_mode())?;

        {
            let mut state = self.state.lock();
            let stamp = state.bump_stamp();
            if let Some(frame) = state.frames.get_mut(&pid) {
                frame.stamp = stamp;
                return Ok(frame.data.clone());
            }
        }

        // Miss: read from the file without holding the pool mutex.
        let file = db.catalog().file(pid.table)?;
        let data = file.read_page(pid)?;

        let mut state = self.state.lock();
        // Another transaction may have installed the page while we read.
        if let Some(frame) = state.frames.get(&pid) {
            return Ok(frame.data.clone());
        }
        if state.frames.len() >= self.capacity {
            state.evict_one()?;
        }
        let stamp = state.bump_stamp();
        state.frames.insert(
            pid,
            Frame {
                data: data.clone(),
                dirtier: None,
                stamp,
            },
        );
        Ok(data)
    }

    /// Installs a modified page image, marking it dirty by `tid`. The
    /// caller must hold the exclusive lock (files do, having fetched the
    /// page with `Perm::ReadWrite`). Installs of uncached pages may evict.
    pub fn put_page(&self, tid: TransactionId, pid: PageId, data: Vec<u8>) -> Result<()> {
        debug_assert!(
            self.lock_manager.holds_lock(tid, pid, LockMode::Exclusive),
            "{tid} wrote {pid} without an exclusive lock"
        );
        let mut state = self.state.lock();
        if let Some(frame) = state.frames.get_mut(&pid) {
            frame.data = data;
            frame.dirtier = Some(tid);
            return Ok(());
        }
        if state.frames.len() >= self.capacity {
            state.evict_one()?;
        }
        let stamp = state.bump_stamp();
        state.frames.insert(
            pid,
            Frame {
                data,
                dirtier: Some(tid),
                stamp,
            },
        );
        Ok(())
    }

    /// Adds a tuple to the named table on behalf of `tid`, delegating to
    /// the table's file, which locks and dirties pages through this pool.
    pub fn insert_tuple(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        table_id: u32,
        tuple: &Tuple,
    ) -> Result<()> {
        let file = db.catalog().file(table_id)?;
        file.insert_tuple(db, tid, tuple)?;
        Ok(())
    }

    /// Removes a tuple on behalf of `tid`, resolving its table from the
    /// record identity.
    pub fn delete_tuple(&self, db: &Arc<Database>, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("cannot delete a tuple without a record id".to_string()))?;
        let file = db.catalog().file(rid.page_id.table)?;
        file.delete_tuple(db, tid, tuple)?;
        Ok(())
    }

    /// Commits or aborts `tid`: flush (commit) or discard (abort) every
    /// cached page it holds exclusively, then release all its locks.
    pub fn transaction_complete(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        commit: bool,
    ) -> Result<()> {
        // Snapshot before releasing anything: releasing mutates the table.
        let locked = self.lock_manager.locked_pages(tid);
        for &(pid, mode) in &locked {
            if mode != LockMode::Exclusive {
                continue;
            }
            let cached = self.state.lock().frames.contains_key(&pid);
            if !cached {
                continue;
            }
            if commit {
                self.flush_page(db, pid)?;
            } else {
                self.discard_page(pid);
            }
        }
        for &(pid, _) in &locked {
            self.lock_manager.release(tid, pid);
        }
        Ok(())
    }

    /// Writes the page back to its file if it is dirty; a no-op otherwise.
    pub fn flush_page(&self, db: &Arc<Database>, pid: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(frame) = state.frames.get_mut(&pid) else {
            return Ok(());
        };
        if frame.dirtier.is_none() {
            return Ok(());
        }
        let file = db.catalog().file(pid.table)?;
        file.write_page(pid, &frame.data)?;
        frame.dirtier = None;
        Ok(())
    }

    /// Flushes every dirty page. Breaks NO-STEAL invariants during normal
    /// operation; for tests only.
    pub fn flush_all_pages(&self, db: &Arc<Database>) -> Result<()> {
        let pids: Vec<PageId> = self.state.lock().frames.keys().copied().collect();
        for pid in pids {
            self.flush_page(db, pid)?;
        }
        Ok(())
    }

    /// Drops the cached image without writing it, reverting the page to
    /// its on-disk state for the next reader.
    pub fn discard_page(&self, pid: PageId) {
        self.state.lock().frames.remove(&pid);
    }

    /// Releases a single lock early. Very risky: only the pool itself and
    /// tests that understand the consequences should call this.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    /// Returns true iff `tid` holds a lock on `pid` at `mode` or better.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        self.lock_manager.holds_lock(tid, pid, mode)
    }

    /// Number of pages currently cached. Never exceeds the capacity.
    pub fn cached_pages(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Returns the transaction that dirtied `pid`, if the page is cached
    /// and dirty. Exposed for invariant checks in tests.
    pub fn dirtier(&self, pid: PageId) -> Option<TransactionId> {
        self.state.lock().frames.get(&pid).and_then(|f| f.dirtier)
    }

    /// Returns whether `pid` is currently cached.
    pub fn is_cached(&self, pid: PageId) -> bool {
        self.state.lock().frames.contains_key(&pid)
    }
}
