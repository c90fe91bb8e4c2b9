use std::sync::Arc;

use crate::common::{DbError, Result, TransactionId};
use crate::database::Database;
use crate::tuple::{Field, FieldType, Schema, Tuple};

use super::OpIterator;

/// Drains its child, deleting every tuple it yields through the buffer
/// pool, and emits a single one-field tuple holding the count. The child
/// must produce tuples that carry record identities.
pub struct Delete {
    db: Arc<Database>,
    tid: TransactionId,
    child: Box<dyn OpIterator>,
    schema: Arc<Schema>,
    done: bool,
}

impl Delete {
    pub fn new(db: Arc<Database>, tid: TransactionId, child: Box<dyn OpIterator>) -> Self {
        Self {
            db,
            tid,
            child,
            schema: Arc::new(Schema::builder().field("count", FieldType::Int).build()),
            done: false,
        }
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> Result<()> {
        self.done = false;
        self.child.open()
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(!self.done)
    }

    fn next(&mut self) -> Result<Tuple> {
        if self.done {
            return Err(DbError::NoSuchElement);
        }
        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.db
                .buffer_pool()
                .delete_tuple(&self.db, self.tid, &tuple)?;
            count += 1;
        }
        self.done = true;
        Ok(Tuple::new(self.schema.clone(), vec![Field::Int(count)]))
    }

    fn rewind(&mut self) -> Result<()> {
        self.done = false;
        self.child.rewind()
    }

    fn close(&mut self) {
        self.done = true;
        self.child.close();
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "delete has exactly one child");
        self.child = children.pop().expect("length checked above");
    }
}
