use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Schema, Tuple};

use super::{JoinPredicate, OpIterator};

/// Simple nested-loops join: for each outer tuple, rewind and scan the
/// inner child, emitting the merged tuple whenever the predicate holds.
/// Neither input is materialized. The output schema is the concatenation
/// of the child schemas.
pub struct Join {
    predicate: JoinPredicate,
    outer: Box<dyn OpIterator>,
    inner: Box<dyn OpIterator>,
    schema: Arc<Schema>,
    current_outer: Option<Tuple>,
    lookahead: Option<Tuple>,
}

impl Join {
    pub fn new(
        predicate: JoinPredicate,
        outer: Box<dyn OpIterator>,
        inner: Box<dyn OpIterator>,
    ) -> Self {
        let schema = Arc::new(Schema::merge(&outer.schema(), &inner.schema()));
        Self {
            predicate,
            outer,
            inner,
            schema,
            current_outer: None,
            lookahead: None,
        }
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if self.current_outer.is_none() {
                if !self.outer.has_next()? {
                    return Ok(None);
                }
                self.current_outer = Some(self.outer.next()?);
                self.inner.rewind()?;
            }
            let outer = self.current_outer.as_ref().expect("set above").clone();
            while self.inner.has_next()? {
                let inner = self.inner.next()?;
                if self.predicate.filter(&outer, &inner) {
                    let mut merged = Tuple::merge(&outer, &inner);
                    // Merge builds a fresh schema; share the cached one.
                    merged = Tuple::new(self.schema.clone(), merged.fields().to_vec());
                    return Ok(Some(merged));
                }
            }
            self.current_outer = None;
        }
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> Result<()> {
        self.outer.open()?;
        self.inner.open()
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
        self.current_outer = None;
        self.outer.rewind()?;
        self.inner.rewind()
    }

    fn close(&mut self) {
        self.lookahead = None;
        self.current_outer = None;
        self.inner.close();
        self.outer.close();
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 2, "join has exactly two children");
        self.inner = children.pop().expect("length checked above");
        self.outer = children.pop().expect("length checked above");
        self.schema = Arc::new(Schema::merge(&self.outer.schema(), &self.inner.schema()));
        self.current_outer = None;
        self.lookahead = None;
    }
}
