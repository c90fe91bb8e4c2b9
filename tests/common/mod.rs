#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use strata::common::TransactionId;
use strata::storage::{DbFile, HeapFile};
use strata::tuple::{Field, FieldType, Schema, Tuple};
use strata::Database;

/// Creates a heap table of `columns` INT fields under `dir`, registers it,
/// and returns its table id.
pub fn create_int_table(db: &Arc<Database>, dir: &Path, name: &str, columns: usize) -> u32 {
    let schema = Arc::new(Schema::of(&vec![FieldType::Int; columns]));
    let file = Arc::new(
        HeapFile::create(dir.join(format!("{name}.dat")), schema).expect("create heap file"),
    );
    let id = file.id();
    db.catalog().add_table(file, name, None);
    id
}

/// Builds an all-INT tuple for the given table.
pub fn int_tuple(db: &Arc<Database>, table_id: u32, values: &[i32]) -> Tuple {
    let schema = db.catalog().schema(table_id).expect("table registered");
    Tuple::new(schema, values.iter().map(|&v| Field::Int(v)).collect())
}

/// Inserts `rows` in a single committed transaction.
pub fn insert_rows(db: &Arc<Database>, table_id: u32, rows: &[Vec<i32>]) {
    let tid = TransactionId::new();
    for row in rows {
        let tuple = int_tuple(db, table_id, row);
        db.buffer_pool()
            .insert_tuple(db, tid, table_id, &tuple)
            .expect("insert");
    }
    db.buffer_pool()
        .transaction_complete(db, tid, true)
        .expect("commit");
}

/// Scans the table in its own committed transaction and returns every row
/// as a vector of INT values, in page order.
pub fn scan_all(db: &Arc<Database>, table_id: u32) -> Vec<Vec<i32>> {
    let tid = TransactionId::new();
    let file = db.catalog().file(table_id).expect("table registered");
    let mut iter = file.iterator(db.clone(), tid);
    iter.open().expect("open");
    let mut rows = Vec::new();
    while iter.has_next().expect("has_next") {
        let tuple = iter.next().expect("next");
        rows.push(
            tuple
                .fields()
                .iter()
                .map(|f| match f {
                    Field::Int(v) => *v,
                    Field::Str(_) => panic!("expected an INT field"),
                })
                .collect(),
        );
    }
    iter.close();
    db.buffer_pool()
        .transaction_complete(db, tid, true)
        .expect("commit");
    rows
}
