use std::sync::Arc;

use crate::common::{Result, TransactionId};
use crate::database::Database;
use crate::storage::FileIterator;
use crate::tuple::{Schema, Tuple};

use super::OpIterator;

/// Sequentially scans every tuple of a table in page order. The output
/// schema is the table schema with each field renamed to `alias.field`.
pub struct SeqScan {
    iter: Box<dyn FileIterator>,
    schema: Arc<Schema>,
}

impl SeqScan {
    pub fn new(
        db: Arc<Database>,
        tid: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> Result<Self> {
        let file = db.catalog().file(table_id)?;
        let schema = Arc::new(file.schema().with_prefix(alias));
        Ok(Self {
            iter: file.iterator(db, tid),
            schema,
        })
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.iter.open()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.iter.has_next()
    }

    fn next(&mut self) -> Result<Tuple> {
        let tuple = self.iter.next()?;
        // Re-dress the tuple in the aliased schema, keeping its record id.
        let rid = tuple.record_id();
        let mut renamed = Tuple::new(self.schema.clone(), tuple.fields().to_vec());
        renamed.set_record_id(rid);
        Ok(renamed)
    }

    fn rewind(&mut self) -> Result<()> {
        self.iter.rewind()
    }

    fn close(&mut self) {
        self.iter.close();
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        Vec::new()
    }

    fn set_children(&mut self, _children: Vec<Box<dyn OpIterator>>) {
        // A scan is a leaf; there is nothing to rewire.
    }
}
