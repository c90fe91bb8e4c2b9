//! The pull-based operator pipeline. An operator tree is opened on a
//! transaction; each `next` pulls one tuple upward through the tree.

mod aggregate;
mod delete;
mod filter;
mod insert;
mod join;
mod predicate;
mod seq_scan;

use std::sync::Arc;

use crate::common::Result;
use crate::tuple::{Schema, Tuple};

pub use aggregate::{Aggregate, AggregateOp, Aggregator, IntegerAggregator, StringAggregator};
pub use delete::Delete;
pub use filter::Filter;
pub use insert::Insert;
pub use join::Join;
pub use predicate::{JoinPredicate, Predicate};
pub use seq_scan::SeqScan;

/// The protocol every relational operator speaks.
///
/// Contract: `next` is called only after `has_next` returned true;
/// `has_next` is idempotent and may cache one tuple of look-ahead;
/// `rewind` restarts from the first tuple; `close` releases child
/// iterators. Errors — including a deadlock abort surfacing from the
/// storage layer — propagate to the caller, never get swallowed.
pub trait OpIterator: Send {
    fn open(&mut self) -> Result<()>;
    fn has_next(&mut self) -> Result<bool>;
    fn next(&mut self) -> Result<Tuple>;
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);

    /// The schema of the tuples this operator emits.
    fn schema(&self) -> Arc<Schema>;

    /// Child operators, in order. Leaves return an empty list.
    fn children(&self) -> Vec<&dyn OpIterator>;

    /// Replaces the child operators, rewiring the tree in place.
    fn set_children(&mut self, children: Vec<Box<dyn OpIterator>>);
}
