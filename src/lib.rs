//! Strata - a disk-oriented relational storage and execution engine
//!
//! Tables live on disk as fixed-size pages, served through a bounded
//! buffer pool with page-level two-phase locking, and queries run as a
//! pull-based iterator pipeline of relational operators backed by either
//! an unordered heap file or a clustered B+ tree index.
//!
//! # Architecture
//!
//! - **Tuples** (`tuple`): the value domain (INT, STRING), schemas and the
//!   fixed-width row codec
//! - **Storage** (`storage`): the heap page byte format, heap files and
//!   the `DbFile` trait every table representation implements
//! - **Concurrency** (`concurrency`): page-granularity shared/exclusive
//!   locks with waits-for deadlock detection
//! - **Buffer pool** (`buffer`): a bounded page cache with LRU eviction of
//!   clean pages and transactional flush/discard at completion
//! - **Index** (`index`): a clustered B+ tree file with point and range
//!   iterators and free-page reuse
//! - **Execution** (`execution`): scan, filter, join, aggregate, insert
//!   and delete operators speaking a shared pull protocol
//! - **Statistics** (`stats`): equi-width histograms and per-table
//!   selectivity estimation
//! - **Catalog** (`catalog`): the table registry
//!
//! A [`Database`] value ties the catalog, the buffer pool and the
//! statistics map together and is passed explicitly wherever the engine
//! needs context.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::common::TransactionId;
//! use strata::execution::{OpIterator, SeqScan};
//! use strata::storage::{DbFile, HeapFile};
//! use strata::tuple::{Field, FieldType, Schema, Tuple};
//! use strata::Database;
//!
//! let db = Database::with_default_pool();
//! let schema = Schema::builder()
//!     .field("id", FieldType::Int)
//!     .field("name", FieldType::Str)
//!     .build_arc();
//! let table = Arc::new(HeapFile::create("users.dat", schema.clone()).unwrap());
//! db.catalog().add_table(table.clone(), "users", Some("id".into()));
//!
//! let tid = TransactionId::new();
//! let tuple = Tuple::new(schema, vec![Field::Int(1), Field::from("ada")]);
//! db.buffer_pool()
//!     .insert_tuple(&db, tid, table.id(), &tuple)
//!     .unwrap();
//!
//! let mut scan = SeqScan::new(db.clone(), tid, table.id(), "u").unwrap();
//! scan.open().unwrap();
//! while scan.has_next().unwrap() {
//!     println!("{}", scan.next().unwrap());
//! }
//! db.buffer_pool().transaction_complete(&db, tid, true).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
mod database;
pub mod execution;
pub mod index;
pub mod stats;
pub mod storage;
pub mod tuple;

pub use common::{DbError, Result};
pub use database::Database;
