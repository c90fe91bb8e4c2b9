use std::sync::Arc;

use strata::common::TransactionId;
use strata::execution::{
    Aggregate, AggregateOp, Filter, OpIterator, Predicate, SeqScan,
};
use strata::storage::{DbFile, HeapFile};
use strata::tuple::{CompareOp, Field, FieldType, Schema, Tuple};
use strata::Database;

fn main() {
    println!("Strata - a disk-oriented relational engine in Rust");
    println!("==================================================\n");

    let db = Database::with_default_pool();
    let schema = Schema::builder()
        .field("id", FieldType::Int)
        .field("score", FieldType::Int)
        .build_arc();

    let table =
        Arc::new(HeapFile::create("demo.dat", schema.clone()).expect("failed to create table"));
    let table_id = table.id();
    db.catalog().add_table(table, "demo", Some("id".into()));
    println!("Created table 'demo' {}", schema.as_ref());

    // Load a few rows in one transaction.
    let tid = TransactionId::new();
    for i in 0..20 {
        let tuple = Tuple::new(schema.clone(), vec![Field::Int(i), Field::Int(i * i % 7)]);
        db.buffer_pool()
            .insert_tuple(&db, tid, table_id, &tuple)
            .expect("insert failed");
    }
    db.buffer_pool()
        .transaction_complete(&db, tid, true)
        .expect("commit failed");
    println!("Inserted 20 rows\n");

    // Scan with a filter: score > 3.
    let tid = TransactionId::new();
    let scan = SeqScan::new(db.clone(), tid, table_id, "d").expect("unknown table");
    let mut filter = Filter::new(
        Predicate::new(1, CompareOp::GreaterThan, Field::Int(3)),
        Box::new(scan),
    );
    filter.open().expect("open failed");
    println!("Rows with score > 3:");
    while filter.has_next().expect("scan failed") {
        println!("  {}", filter.next().expect("scan failed"));
    }
    filter.close();

    // Average score over the whole table.
    let scan = SeqScan::new(db.clone(), tid, table_id, "d").expect("unknown table");
    let mut avg = Aggregate::new(Box::new(scan), 1, None, AggregateOp::Avg);
    avg.open().expect("open failed");
    if avg.has_next().expect("aggregate failed") {
        println!("\nAverage score: {}", avg.next().expect("aggregate failed"));
    }
    avg.close();

    db.buffer_pool()
        .transaction_complete(&db, tid, true)
        .expect("commit failed");
}
