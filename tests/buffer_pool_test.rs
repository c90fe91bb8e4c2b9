mod common;

use common::{create_int_table, int_tuple, scan_all};
use strata::buffer::Perm;
use strata::common::{page_size, PageId, TransactionId};
use strata::{Database, DbError};

fn add_empty_pages(db: &std::sync::Arc<Database>, table: u32, pages: u32) {
    let file = db.catalog().file(table).unwrap();
    let empty = vec![0u8; page_size()];
    let existing = file.num_pages().unwrap();
    for n in existing..existing + pages {
        file.write_page(PageId::new(table, n), &empty).unwrap();
    }
}

/// S4: with the pool at capacity, only clean pages are eviction
/// candidates; a page dirtied by an uncommitted transaction stays put.
#[test]
fn test_eviction_skips_dirty_pages() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(2);
    let table = create_int_table(&db, dir.path(), "t", 2);
    add_empty_pages(&db, table, 2); // pages 0, 1, 2 on disk

    let p0 = PageId::new(table, 0);
    let p1 = PageId::new(table, 1);
    let p2 = PageId::new(table, 2);

    // T1 reads pages 0 and 1 shared, then commits, leaving them cached
    // and clean.
    let t1 = TransactionId::new();
    db.buffer_pool().get_page(&db, t1, p0, Perm::ReadOnly).unwrap();
    db.buffer_pool().get_page(&db, t1, p1, Perm::ReadOnly).unwrap();
    db.buffer_pool().transaction_complete(&db, t1, true).unwrap();

    // T2 dirties page 0 and stays open.
    let t2 = TransactionId::new();
    let tuple = int_tuple(&db, table, &[1, 1]);
    db.buffer_pool().insert_tuple(&db, t2, table, &tuple).unwrap();
    assert_eq!(db.buffer_pool().dirtier(p0), Some(t2));

    // T3 faults in page 2: the only evictable page is the clean page 1.
    let t3 = TransactionId::new();
    db.buffer_pool().get_page(&db, t3, p2, Perm::ReadOnly).unwrap();

    assert!(db.buffer_pool().is_cached(p0), "dirty page must not be evicted");
    assert!(!db.buffer_pool().is_cached(p1), "clean page was the victim");
    assert!(db.buffer_pool().is_cached(p2));

    db.buffer_pool().transaction_complete(&db, t2, true).unwrap();
    db.buffer_pool().transaction_complete(&db, t3, true).unwrap();
}

/// The pool never holds more pages than its capacity.
#[test]
fn test_pool_size_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(3);
    let table = create_int_table(&db, dir.path(), "t", 2);
    add_empty_pages(&db, table, 9); // 10 pages on disk

    let tid = TransactionId::new();
    for n in 0..10 {
        db.buffer_pool()
            .get_page(&db, tid, PageId::new(table, n), Perm::ReadOnly)
            .unwrap();
        assert!(db.buffer_pool().cached_pages() <= 3);
    }
    db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
}

/// When every cached page is dirty, a fault fails rather than evicting
/// dirty data (NO-STEAL has no undo log to fall back on).
#[test]
fn test_all_dirty_pool_refuses_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(1);
    let table = create_int_table(&db, dir.path(), "t", 2);
    add_empty_pages(&db, table, 1); // pages 0, 1

    let t1 = TransactionId::new();
    let tuple = int_tuple(&db, table, &[5, 5]);
    db.buffer_pool().insert_tuple(&db, t1, table, &tuple).unwrap();

    let t2 = TransactionId::new();
    let err = db
        .buffer_pool()
        .get_page(&db, t2, PageId::new(table, 1), Perm::ReadOnly)
        .unwrap_err();
    assert!(matches!(err, DbError::NoEvictablePage));

    // Committing T1 cleans the page; T2 can now proceed.
    db.buffer_pool().transaction_complete(&db, t1, true).unwrap();
    db.buffer_pool()
        .get_page(&db, t2, PageId::new(table, 1), Perm::ReadOnly)
        .unwrap();
    db.buffer_pool().transaction_complete(&db, t2, true).unwrap();
}

/// LRU: the least recently used clean page is the one evicted.
#[test]
fn test_lru_evicts_oldest_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(2);
    let table = create_int_table(&db, dir.path(), "t", 2);
    add_empty_pages(&db, table, 2); // pages 0, 1, 2

    let tid = TransactionId::new();
    let p0 = PageId::new(table, 0);
    let p1 = PageId::new(table, 1);
    let p2 = PageId::new(table, 2);

    db.buffer_pool().get_page(&db, tid, p0, Perm::ReadOnly).unwrap();
    db.buffer_pool().get_page(&db, tid, p1, Perm::ReadOnly).unwrap();
    // Touch page 0 again so page 1 is the least recently used.
    db.buffer_pool().get_page(&db, tid, p0, Perm::ReadOnly).unwrap();

    db.buffer_pool().get_page(&db, tid, p2, Perm::ReadOnly).unwrap();
    assert!(db.buffer_pool().is_cached(p0));
    assert!(!db.buffer_pool().is_cached(p1));
    db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
}

/// flush_all_pages persists everything for test harnesses.
#[test]
fn test_flush_all_pages() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::with_default_pool();
    let table = create_int_table(&db, dir.path(), "t", 2);

    let tid = TransactionId::new();
    let tuple = int_tuple(&db, table, &[9, 9]);
    db.buffer_pool().insert_tuple(&db, tid, table, &tuple).unwrap();
    db.buffer_pool().flush_all_pages(&db).unwrap();
    assert_eq!(db.buffer_pool().dirtier(PageId::new(table, 0)), None);

    db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
    assert_eq!(scan_all(&db, table), vec![vec![9, 9]]);
}
