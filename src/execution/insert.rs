use std::sync::Arc;

use crate::common::{DbError, Result, TransactionId};
use crate::database::Database;
use crate::tuple::{Field, FieldType, Schema, Tuple};

use super::OpIterator;

/// Drains its child into a table through the buffer pool and emits a
/// single one-field tuple holding the number of inserted rows. Storage
/// errors, including deadlock aborts, propagate to the caller.
pub struct Insert {
    db: Arc<Database>,
    tid: TransactionId,
    child: Box<dyn OpIterator>,
    table_id: u32,
    schema: Arc<Schema>,
    done: bool,
}

impl Insert {
    pub fn new(
        db: Arc<Database>,
        tid: TransactionId,
        child: Box<dyn OpIterator>,
        table_id: u32,
    ) -> Result<Self> {
        let table_schema = db.catalog().schema(table_id)?;
        if child.schema().as_ref() != table_schema.as_ref() {
            return Err(DbError::Db(
                "child schema does not match the target table".to_string(),
            ));
        }
        Ok(Self {
            db,
            tid,
            child,
            table_id,
            schema: Arc::new(Schema::builder().field("count", FieldType::Int).build()),
            done: false,
        })
    }
}

impl OpIterator for Insert {
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
                .insert_tuple(&self.db, self.tid, self.table_id, &tuple)?;
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
        assert_eq!(children.len(), 1, "insert has exactly one child");
        self.child = children.pop().expect("length checked above");
    }
}
