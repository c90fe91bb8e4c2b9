use crate::buffer::Perm;
use crate::common::{DbError, Result};
use crate::storage::FileIterator;
use crate::tuple::{CompareOp, Field, Tuple};

use super::btree_file::TreeOp;
use super::btree_page::NO_PAGE;

/// A `key op literal` condition over the index key, restricted to the
/// point and range operators an ordered index can serve.
#[derive(Debug, Clone)]
pub struct IndexPredicate {
    pub op: CompareOp,
    pub operand: Field,
}

impl IndexPredicate {
    /// # Panics
    /// Panics on `NotEquals`; an ordered index cannot serve it.
    pub fn new(op: CompareOp, operand: Field) -> Self {
        assert!(
            op != CompareOp::NotEquals,
            "an index iterator cannot serve NotEquals"
        );
        Self { op, operand }
    }
}

/// Walks the leaf chain in ascending key order, optionally bounded by an
/// index predicate. Leaves are read through the buffer pool with shared
/// locks, which are retained until the transaction completes.
pub(crate) struct BTreeFileIterator {
    op: TreeOp,
    predicate: Option<IndexPredicate>,
    tuples: Vec<Tuple>,
    next_leaf: u32,
    index: usize,
    opened: bool,
    done: bool,
}

impl BTreeFileIterator {
    pub(crate) fn new(op: TreeOp, predicate: Option<IndexPredicate>) -> Self {
        Self {
            op,
            predicate,
            tuples: Vec::new(),
            next_leaf: NO_PAGE,
            index: 0,
            opened: false,
            done: false,
        }
    }

    fn load_leaf(&mut self, page_no: u32) -> Result<()> {
        let leaf = self.op.leaf(page_no, Perm::ReadOnly)?;
        self.tuples = leaf.tuples(self.op.table_id())?;
        self.next_leaf = leaf.next();
        self.index = 0;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.tuples.clear();
        self.index = 0;
        self.next_leaf = NO_PAGE;
        self.done = false;

        // Point and lower-bounded scans start at the leftmost candidate
        // leaf for the operand; upper-bounded scans start at the leftmost
        // leaf and stop at the bound.
        let start_key = match &self.predicate {
            Some(p) if matches!(
                p.op,
                CompareOp::Equals | CompareOp::GreaterThan | CompareOp::GreaterThanOrEq
            ) =>
            {
                Some(&p.operand)
            }
            _ => None,
        };
        let leaf_no = self.op.find_leaf(start_key)?;
        if leaf_no == NO_PAGE {
            self.done = true;
        } else {
            self.load_leaf(leaf_no)?;
        }
        self.opened = true;
        Ok(())
    }

    fn key_of(&self, tuple: &Tuple) -> Field {
        tuple.field(self.op.key_field()).clone()
    }
}

impl FileIterator for BTreeFileIterator {
    fn open(&mut self) -> Result<()> {
        self.reset()
    }

    fn has_next(&mut self) -> Result<bool> {
        if !self.opened || self.done {
            return Ok(false);
        }
        loop {
            if self.index < self.tuples.len() {
                let Some(predicate) = &self.predicate else {
                    return Ok(true);
                };
                let key = self.key_of(&self.tuples[self.index]);
                match predicate.op {
                    CompareOp::Equals => {
                        if key < predicate.operand {
                            self.index += 1;
                            continue;
                        }
                        if key == predicate.operand {
                            return Ok(true);
                        }
                        self.done = true;
                        return Ok(false);
                    }
                    CompareOp::GreaterThan => {
                        if key <= predicate.operand {
                            self.index += 1;
                            continue;
                        }
                        return Ok(true);
                    }
                    CompareOp::GreaterThanOrEq => {
                        if key < predicate.operand {
                            self.index += 1;
                            continue;
                        }
                        return Ok(true);
                    }
                    CompareOp::LessThan => {
                        if key < predicate.operand {
                            return Ok(true);
                        }
                        self.done = true;
                        return Ok(false);
                    }
                    CompareOp::LessThanOrEq => {
                        if key <= predicate.operand {
                            return Ok(true);
                        }
                        self.done = true;
                        return Ok(false);
                    }
                    CompareOp::NotEquals => unreachable!("rejected at construction"),
                }
            }
            if self.next_leaf == NO_PAGE {
                self.done = true;
                return Ok(false);
            }
            let next = self.next_leaf;
            self.load_leaf(next)?;
        }
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        let tuple = self.tuples[self.index].clone();
        self.index += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reset()
    }

    fn close(&mut self) {
        self.opened = false;
        self.done = true;
        self.tuples.clear();
    }
}
