use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Schema, Tuple};

use super::{OpIterator, Predicate};

/// Emits the child tuples that satisfy a predicate. The output schema is
/// the child schema.
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    lookahead: Option<Tuple>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            lookahead: None,
        }
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.filter(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn has_next(&mut self) -> Result<bool> {
        if self.lookahead.is_none() {
            self.lookahead = self.fetch_next()?;
        }
        Ok(self.lookahead.is_some())
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        Ok(self.lookahead.take().expect("has_next cached a tuple"))
    }

    fn rewind(&mut self) -> Result<()> {
        self.lookahead = None;
        self.child.rewind()
    }

    fn close(&mut self) {
        self.lookahead = None;
        self.child.close();
    }

    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "filter has exactly one child");
        self.child = children.pop().expect("length checked above");
        self.lookahead = None;
    }
}
