use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction identifier, unique for the process lifetime.
///
/// Identifiers are vended from a monotonic counter, so comparing two ids
/// also compares the ages of their transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

impl TransactionId {
    /// Starts a new transaction by vending a fresh identifier.
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Page identifier type - uniquely identifies a page within a table file.
/// The table id is stable for the file's lifetime; page numbers are
/// zero-based and dense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table: u32,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table: u32, page_no: u32) -> Self {
        Self { table, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({}:{})", self.table, self.page_no)
    }
}

/// Record identifier - combination of page ID and slot number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({}, slot {})", self.page_id, self.slot)
    }
}
