use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use rand::prelude::*;
use strata::common::TransactionId;
use strata::index::{BTreeFile, IndexPredicate};
use strata::storage::DbFile;
use strata::tuple::{CompareOp, Field, FieldType, Schema, Tuple};
use strata::{Database, DbError};

fn open_tree(db: &Arc<Database>, dir: &std::path::Path, name: &str) -> (Arc<BTreeFile>, u32) {
    let schema = Arc::new(Schema::of(&[FieldType::Int, FieldType::Int]));
    let tree = Arc::new(
        BTreeFile::open(dir.join(format!("{name}.idx")), schema, 0).expect("open btree"),
    );
    let id = tree.id();
    db.catalog().add_table(tree.clone(), name, None);
    (tree, id)
}

fn tree_tuple(tree: &BTreeFile, key: i32, value: i32) -> Tuple {
    Tuple::new(
        tree.schema().clone(),
        vec![Field::Int(key), Field::Int(value)],
    )
}

fn insert_committed(db: &Arc<Database>, tree: &BTreeFile, rows: &[(i32, i32)]) {
    let tid = TransactionId::new();
    for &(k, v) in rows {
        tree.insert_tuple(db, tid, &tree_tuple(tree, k, v)).unwrap();
    }
    db.buffer_pool().transaction_complete(db, tid, true).unwrap();
}

fn scan_keys(db: &Arc<Database>, tree: &Arc<BTreeFile>) -> Vec<(i32, i32)> {
    let tid = TransactionId::new();
    let mut iter = tree.iterator(db.clone(), tid);
    iter.open().unwrap();
    let mut out = Vec::new();
    while iter.has_next().unwrap() {
        let t = iter.next().unwrap();
        match (t.field(0), t.field(1)) {
            (Field::Int(k), Field::Int(v)) => out.push((*k, *v)),
            _ => unreachable!(),
        }
    }
    iter.close();
    db.buffer_pool().transaction_complete(db, tid, true).unwrap();
    out
}

fn lookup(db: &Arc<Database>, tree: &Arc<BTreeFile>, key: i32) -> Vec<(i32, i32)> {
    let tid = TransactionId::new();
    let mut iter = tree.index_iterator(
        db.clone(),
        tid,
        IndexPredicate::new(CompareOp::Equals, Field::Int(key)),
    );
    iter.open().unwrap();
    let mut out = Vec::new();
    while iter.has_next().unwrap() {
        let t = iter.next().unwrap();
        match (t.field(0), t.field(1)) {
            (Field::Int(k), Field::Int(v)) => out.push((*k, *v)),
            _ => unreachable!(),
        }
    }
    iter.close();
    db.buffer_pool().transaction_complete(db, tid, true).unwrap();
    out
}

#[test]
fn test_ordered_scan_over_random_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "scan");

    let mut rng = StdRng::seed_from_u64(42);
    let rows: Vec<(i32, i32)> = (0..5000).map(|i| (rng.gen_range(0..100_000), i)).collect();
    insert_committed(&db, &tree, &rows);

    let scanned = scan_keys(&db, &tree);
    assert_eq!(scanned.len(), rows.len());
    for pair in scanned.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "scan must be non-decreasing in key");
    }

    let expected: HashSet<(i32, i32)> = rows.into_iter().collect();
    let seen: HashSet<(i32, i32)> = scanned.into_iter().collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_point_lookup_recall() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "recall");

    let rows: Vec<(i32, i32)> = (0..2000).map(|i| (i * 3, i)).collect();
    insert_committed(&db, &tree, &rows);

    for &(k, v) in rows.iter().step_by(37) {
        assert_eq!(lookup(&db, &tree, k), vec![(k, v)], "missing key {k}");
    }
    assert!(lookup(&db, &tree, 1).is_empty());
}

#[test]
fn test_duplicate_keys_span_and_are_found() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "dups");

    // Enough duplicates of one key to cross a leaf boundary.
    let mut rows: Vec<(i32, i32)> = (0..600).map(|v| (7, v)).collect();
    rows.extend((0..600).map(|v| (3, 1000 + v)));
    rows.extend((0..10).map(|v| (9, 2000 + v)));
    insert_committed(&db, &tree, &rows);

    let sevens = lookup(&db, &tree, 7);
    assert_eq!(sevens.len(), 600);
    assert!(sevens.iter().all(|&(k, _)| k == 7));

    let threes = lookup(&db, &tree, 3);
    assert_eq!(threes.len(), 600);
    assert_eq!(lookup(&db, &tree, 9).len(), 10);
    assert_eq!(scan_keys(&db, &tree).len(), 1210);
}

#[test]
fn test_range_predicates() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "range");
    insert_committed(&db, &tree, &(0..100).map(|k| (k, k)).collect::<Vec<_>>());

    let count = |op, v| {
        let tid = TransactionId::new();
        let mut iter =
            tree.index_iterator(db.clone(), tid, IndexPredicate::new(op, Field::Int(v)));
        iter.open().unwrap();
        let mut n = 0;
        while iter.has_next().unwrap() {
            iter.next().unwrap();
            n += 1;
        }
        iter.close();
        db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
        n
    };

    assert_eq!(count(CompareOp::GreaterThanOrEq, 50), 50);
    assert_eq!(count(CompareOp::GreaterThan, 50), 49);
    assert_eq!(count(CompareOp::LessThan, 10), 10);
    assert_eq!(count(CompareOp::LessThanOrEq, 10), 11);
    assert_eq!(count(CompareOp::Equals, 99), 1);
    assert_eq!(count(CompareOp::Equals, 100), 0);
}

#[test]
fn test_deleted_pages_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "churn");

    let rows: Vec<(i32, i32)> = (0..3000).map(|i| (i, i)).collect();
    insert_committed(&db, &tree, &rows);
    let peak_pages = tree.num_pages().unwrap();

    // Delete everything, then insert a same-sized batch again; the freed
    // pages must be reused rather than the file growing.
    let tid = TransactionId::new();
    let mut iter = tree.iterator(db.clone(), tid);
    iter.open().unwrap();
    let mut victims = Vec::new();
    while iter.has_next().unwrap() {
        victims.push(iter.next().unwrap());
    }
    iter.close();
    for victim in &victims {
        tree.delete_tuple(&db, tid, victim).unwrap();
    }
    db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
    assert!(scan_keys(&db, &tree).is_empty());

    insert_committed(&db, &tree, &rows);
    assert_eq!(scan_keys(&db, &tree).len(), 3000);

    let after_pages = tree.num_pages().unwrap();
    assert!(
        after_pages <= peak_pages + 2,
        "pages grew from {peak_pages} to {after_pages}; freed pages were not reused"
    );
}

/// S5 in miniature: concurrent inserters and deleters, each operation its
/// own transaction retried on deadlock abort; afterwards the scan is
/// ordered and every surviving tuple answers a point lookup.
#[test]
fn test_concurrent_insert_delete_stress() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(200);
    let (tree, _) = open_tree(&db, dir.path(), "stress");

    let live: Arc<Mutex<HashSet<(i32, i32)>>> = Arc::new(Mutex::new(HashSet::new()));
    let threads: Vec<_> = (0..8)
        .map(|w| {
            let db = db.clone();
            let tree = tree.clone();
            let live = live.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(w as u64);
                let mut mine: Vec<(i32, i32)> = Vec::new();
                for i in 0..30 {
                    let key = rng.gen_range(0..500);
                    let value = w * 10_000 + i;
                    retry(|| {
                        let tid = TransactionId::new();
                        let res = tree
                            .insert_tuple(&db, tid, &tree_tuple(&tree, key, value))
                            .and_then(|_| {
                                db.buffer_pool().transaction_complete(&db, tid, true)
                            });
                        finish(&db, tid, res)
                    });
                    live.lock().unwrap().insert((key, value));
                    mine.push((key, value));

                    // Every other round, remove an earlier tuple of ours.
                    if i % 2 == 1 {
                        let (k, v) = mine.remove(0);
                        retry(|| {
                            let tid = TransactionId::new();
                            let res = delete_exact(&db, &tree, tid, k, v).and_then(|_| {
                                db.buffer_pool().transaction_complete(&db, tid, true)
                            });
                            finish(&db, tid, res)
                        });
                        live.lock().unwrap().remove(&(k, v));
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let live = live.lock().unwrap();
    let scanned = scan_keys(&db, &tree);
    assert_eq!(scanned.len(), live.len());
    for pair in scanned.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
    }
    let seen: HashSet<(i32, i32)> = scanned.into_iter().collect();
    assert_eq!(seen, *live);

    for &(k, v) in live.iter() {
        assert!(
            lookup(&db, &tree, k).contains(&(k, v)),
            "tuple ({k}, {v}) lost"
        );
    }
}

/// Runs one attempt; returns false to request a retry after an abort.
fn finish(
    db: &Arc<Database>,
    tid: TransactionId,
    res: Result<(), DbError>,
) -> bool {
    match res {
        Ok(()) => true,
        Err(DbError::Abort) => {
            db.buffer_pool()
                .transaction_complete(db, tid, false)
                .expect("abort cleanup");
            false
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
}

fn retry(mut attempt: impl FnMut() -> bool) {
    while !attempt() {
        thread::yield_now();
    }
}

/// Finds the tuple (key, value) through a point lookup and deletes it
/// within the same transaction.
fn delete_exact(
    db: &Arc<Database>,
    tree: &Arc<BTreeFile>,
    tid: TransactionId,
    key: i32,
    value: i32,
) -> Result<(), DbError> {
    let mut iter = tree.index_iterator(
        db.clone(),
        tid,
        IndexPredicate::new(CompareOp::Equals, Field::Int(key)),
    );
    iter.open()?;
    while iter.has_next()? {
        let t = iter.next()?;
        if t.field(1) == &Field::Int(value) {
            iter.close();
            tree.delete_tuple(db, tid, &t)?;
            return Ok(());
        }
    }
    iter.close();
    Err(DbError::Db(format!("tuple ({key}, {value}) not found")))
}
