mod common;

use std::sync::Arc;
use std::thread;

use common::{create_int_table, int_tuple, insert_rows, scan_all};
use strata::buffer::Perm;
use strata::common::{PageId, TransactionId};
use strata::concurrency::LockMode;
use strata::{Database, DbError};

/// S3: an aborted transaction's writes are discarded; a later reader
/// observes the table as it was.
#[test]
fn test_abort_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);

    let tid = TransactionId::new();
    for i in 0..10 {
        let tuple = int_tuple(&db, table, &[i, i]);
        db.buffer_pool()
            .insert_tuple(&db, tid, table, &tuple)
            .unwrap();
    }
    let pid = PageId::new(table, 0);
    assert_eq!(db.buffer_pool().dirtier(pid), Some(tid));

    db.buffer_pool()
        .transaction_complete(&db, tid, false)
        .unwrap();

    // The dirty page was dropped from the cache entirely.
    assert!(!db.buffer_pool().is_cached(pid));
    assert_eq!(scan_all(&db, table).len(), 0);
}

/// Commit makes writes durable and leaves no locks or dirt behind.
#[test]
fn test_commit_flushes_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);

    let tid = TransactionId::new();
    let tuple = int_tuple(&db, table, &[7, 8]);
    db.buffer_pool()
        .insert_tuple(&db, tid, table, &tuple)
        .unwrap();
    db.buffer_pool()
        .transaction_complete(&db, tid, true)
        .unwrap();

    let pid = PageId::new(table, 0);
    assert_eq!(db.buffer_pool().dirtier(pid), None);
    assert!(!db.buffer_pool().holds_lock(tid, pid, LockMode::Shared));

    // A different database instance over the same file sees the row.
    let db2 = Database::with_default_pool();
    let schema = db.catalog().schema(table).unwrap();
    let file = Arc::new(
        strata::storage::HeapFile::open(dir.path().join("t.dat"), schema).unwrap(),
    );
    db2.catalog().add_table(file, "t", None);
    assert_eq!(scan_all(&db2, table), vec![vec![7, 8]]);
}

/// S2: two transactions cross-requesting each other's exclusively held
/// pages; exactly one observes the abort, the other completes.
#[test]
fn test_cross_lock_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);
    // Two empty pages.
    let file = db.catalog().file(table).unwrap();
    let empty = vec![0u8; strata::common::page_size()];
    file.write_page(PageId::new(table, 1), &empty).unwrap();

    let p0 = PageId::new(table, 0);
    let p1 = PageId::new(table, 1);
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    db.buffer_pool().get_page(&db, t1, p0, Perm::ReadWrite).unwrap();
    db.buffer_pool().get_page(&db, t2, p1, Perm::ReadWrite).unwrap();

    let run = |db: Arc<Database>, tid: TransactionId, want: PageId| {
        thread::spawn(move || {
            let res = db.buffer_pool().get_page(&db, tid, want, Perm::ReadWrite);
            match res {
                Ok(_) => {
                    db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
                    true
                }
                Err(DbError::Abort) => {
                    db.buffer_pool().transaction_complete(&db, tid, false).unwrap();
                    false
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        })
    };

    let h1 = run(db.clone(), t1, p1);
    let h2 = run(db.clone(), t2, p0);
    let ok1 = h1.join().unwrap();
    let ok2 = h2.join().unwrap();
    assert_ne!(ok1, ok2, "exactly one transaction aborts, one commits");
}

/// Concurrent single-row writers with retries all eventually commit.
#[test]
fn test_concurrent_writers_with_retry() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);

    let threads: Vec<_> = (0..8)
        .map(|w| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let value = w * 100 + i;
                    loop {
                        let tid = TransactionId::new();
                        let tuple = int_tuple(&db, table, &[value, w]);
                        let res = db
                            .buffer_pool()
                            .insert_tuple(&db, tid, table, &tuple)
                            .and_then(|_| {
                                db.buffer_pool().transaction_complete(&db, tid, true)
                            });
                        match res {
                            Ok(()) => break,
                            Err(DbError::Abort) => {
                                db.buffer_pool()
                                    .transaction_complete(&db, tid, false)
                                    .unwrap();
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let mut rows: Vec<i32> = scan_all(&db, table).into_iter().map(|r| r[0]).collect();
    rows.sort_unstable();
    let mut expected: Vec<i32> = (0..8).flat_map(|w| (0..25).map(move |i| w * 100 + i)).collect();
    expected.sort_unstable();
    assert_eq!(rows, expected);
}

/// Readers holding shared locks are never flushed or discarded by commit.
#[test]
fn test_shared_pages_survive_other_commits() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);
    insert_rows(&db, table, &[vec![1, 1]]);

    let reader = TransactionId::new();
    let p0 = PageId::new(table, 0);
    db.buffer_pool().get_page(&db, reader, p0, Perm::ReadOnly).unwrap();
    assert!(db.buffer_pool().holds_lock(reader, p0, LockMode::Shared));

    db.buffer_pool().transaction_complete(&db, reader, true).unwrap();
    assert!(!db.buffer_pool().holds_lock(reader, p0, LockMode::Shared));
    // The page is still cached and clean.
    assert!(db.buffer_pool().is_cached(p0));
    assert_eq!(db.buffer_pool().dirtier(p0), None);
}
