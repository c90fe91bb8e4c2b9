use std::sync::Arc;

use crate::common::config::{IO_COST_PER_PAGE, NUM_HIST_BUCKETS};
use crate::common::{Result, TransactionId};
use crate::database::Database;
use crate::tuple::{CompareOp, Field, FieldType};

use super::{IntHistogram, StrHistogram};

enum FieldHistogram {
    Int(IntHistogram),
    Str(StrHistogram),
}

/// Per-table statistics: one histogram per field, built by two passes over
/// the table (the first learns each integer field's min and max, the
/// second populates the buckets), plus the page count for scan costing.
pub struct TableStats {
    n_tuples: usize,
    num_pages: u32,
    io_cost_per_page: usize,
    histograms: Vec<FieldHistogram>,
}

impl TableStats {
    /// Builds statistics for a table with the default I/O cost model.
    pub fn build(db: &Arc<Database>, table_id: u32) -> Result<Self> {
        Self::build_with_cost(db, table_id, IO_COST_PER_PAGE)
    }

    /// Builds statistics for a table, charging `io_cost_per_page` per page
    /// of sequential I/O.
    pub fn build_with_cost(
        db: &Arc<Database>,
        table_id: u32,
        io_cost_per_page: usize,
    ) -> Result<Self> {
        let file = db.catalog().file(table_id)?;
        let schema = file.schema().clone();
        let n_fields = schema.num_fields();

        // The scan runs in its own read-only transaction, committed at the
        // end so the shared locks drain.
        let tid = TransactionId::new();
        let mut iter = file.iterator(db.clone(), tid);

        let mut mins = vec![i32::MAX; n_fields];
        let mut maxs = vec![i32::MIN; n_fields];
        let mut n_tuples = 0usize;

        iter.open()?;
        while iter.has_next()? {
            let tuple = iter.next()?;
            n_tuples += 1;
            for i in 0..n_fields {
                if let Field::Int(v) = tuple.field(i) {
                    mins[i] = mins[i].min(*v);
                    maxs[i] = maxs[i].max(*v);
                }
            }
        }

        let mut histograms: Vec<FieldHistogram> = (0..n_fields)
            .map(|i| match schema.field_type(i) {
                FieldType::Int => {
                    // An empty table still gets a well-formed histogram.
                    let (min, max) = if mins[i] <= maxs[i] {
                        (mins[i], maxs[i])
                    } else {
                        (0, 0)
                    };
                    FieldHistogram::Int(IntHistogram::new(NUM_HIST_BUCKETS, min, max))
                }
                FieldType::Str => FieldHistogram::Str(StrHistogram::new(NUM_HIST_BUCKETS)),
            })
            .collect();

        iter.rewind()?;
        while iter.has_next()? {
            let tuple = iter.next()?;
            for (i, histogram) in histograms.iter_mut().enumerate() {
                match (histogram, tuple.field(i)) {
                    (FieldHistogram::Int(h), Field::Int(v)) => h.add_value(*v),
                    (FieldHistogram::Str(h), Field::Str(s)) => h.add_value(s),
                    _ => unreachable!("histogram kind follows the schema"),
                }
            }
        }
        iter.close();
        db.buffer_pool().transaction_complete(db, tid, true)?;

        Ok(Self {
            n_tuples,
            num_pages: file.num_pages()?,
            io_cost_per_page,
            histograms,
        })
    }

    /// The cost of a full sequential scan: pages times per-page I/O cost.
    pub fn estimate_scan_cost(&self) -> f64 {
        self.num_pages as f64 * self.io_cost_per_page as f64
    }

    /// The number of tuples a scan with the given predicate selectivity is
    /// expected to produce.
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.n_tuples as f64 * selectivity) as usize
    }

    /// Estimates the selectivity of `field op constant` on this table.
    pub fn estimate_selectivity(&self, field: usize, op: CompareOp, constant: &Field) -> f64 {
        match (&self.histograms[field], constant) {
            (FieldHistogram::Int(h), Field::Int(v)) => h.estimate_selectivity(op, *v),
            (FieldHistogram::Str(h), Field::Str(s)) => h.estimate_selectivity(op, s),
            _ => panic!("constant type does not match field type"),
        }
    }

    /// The expected selectivity of `field op ?` when the constant is
    /// unknown.
    pub fn avg_selectivity(&self, _field: usize, _op: CompareOp) -> f64 {
        1.0
    }

    /// Total number of tuples in the table.
    pub fn total_tuples(&self) -> usize {
        self.n_tuples
    }
}
