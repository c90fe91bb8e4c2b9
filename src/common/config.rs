use std::sync::atomic::{AtomicUsize, Ordering};

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity (number of pages)
pub const DEFAULT_POOL_SIZE: usize = 50;

/// Number of buckets per histogram. Selectivity tests assume at least 100.
pub const NUM_HIST_BUCKETS: usize = 100;

/// Cost charged per page of sequential I/O by the statistics module
pub const IO_COST_PER_PAGE: usize = 1000;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Returns the process-global page size.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Overrides the process-global page size. Must be called before any pages
/// are read, written or cached; changing it afterwards invalidates every
/// on-disk layout. Intended for tests.
pub fn set_page_size(size: usize) {
    assert!(size > 0, "page size must be positive");
    PAGE_SIZE.store(size, Ordering::Relaxed);
}
