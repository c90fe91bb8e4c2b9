use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised only by the lock manager when the caller is chosen as a
    /// deadlock victim. The caller must complete its transaction with
    /// `commit = false`.
    #[error("transaction aborted to resolve a deadlock")]
    Abort,

    #[error("buffer pool is full and every cached page is dirty")]
    NoEvictablePage,

    #[error("tuple belongs to table {actual}, not table {expected}")]
    TableMismatch { expected: u32, actual: u32 },

    #[error("no table named '{0}'")]
    NoSuchTable(String),

    #[error("no table with id {0}")]
    NoSuchTableId(u32),

    #[error("iterator has no more tuples")]
    NoSuchElement,

    #[error("page {0} has no free slot")]
    PageFull(PageId),

    #[error("{0}")]
    Db(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
