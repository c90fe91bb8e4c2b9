use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Field, FieldType, Schema, Tuple};

use super::OpIterator;

/// The aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateOp {
    fn name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        }
    }
}

/// Incrementally folds tuples into per-group aggregate state and reports
/// one result tuple per group. The group key is `None` when the
/// aggregation is ungrouped.
pub trait Aggregator: Send {
    /// Folds one tuple into its group.
    fn merge(&mut self, tuple: &Tuple) -> Result<()>;

    /// The schema of the result tuples: `[Int]` without grouping,
    /// `[group_type, Int]` with.
    fn schema(&self) -> Arc<Schema>;

    /// One result tuple per group, in no particular order.
    fn results(&self) -> Result<Vec<Tuple>>;
}

fn result_schema(group_type: Option<FieldType>, op: AggregateOp) -> Arc<Schema> {
    let value_name = format!("{}Value", op.name());
    match group_type {
        None => Arc::new(Schema::builder().field(value_name, FieldType::Int).build()),
        Some(group_type) => Arc::new(
            Schema::builder()
                .field("groupValue", group_type)
                .field(value_name, FieldType::Int)
                .build(),
        ),
    }
}

/// Aggregate state for one group of integer values. Sums wrap on overflow
/// rather than being guarded.
#[derive(Debug, Clone, Copy)]
enum IntState {
    Simple(i32),
    Avg { sum: i32, count: i32 },
}

/// Computes MIN, MAX, SUM, COUNT or AVG over an integer field. AVG keeps
/// (sum, count) and reports the truncating integer quotient.
pub struct IntegerAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    groups: HashMap<Option<Field>, IntState>,
    schema: Arc<Schema>,
}

impl IntegerAggregator {
    /// `group_field` is `None` for ungrouped aggregation; `group_type`
    /// must be given exactly when grouping.
    pub fn new(
        group_field: Option<usize>,
        group_type: Option<FieldType>,
        agg_field: usize,
        op: AggregateOp,
    ) -> Self {
        assert_eq!(
            group_field.is_some(),
            group_type.is_some(),
            "group type must accompany a group field"
        );
        Self {
            group_field,
            agg_field,
            op,
            groups: HashMap::new(),
            schema: result_schema(group_type, op),
        }
    }

    fn initial_state(op: AggregateOp) -> IntState {
        match op {
            AggregateOp::Min => IntState::Simple(i32::MAX),
            AggregateOp::Max => IntState::Simple(i32::MIN),
            AggregateOp::Sum | AggregateOp::Count => IntState::Simple(0),
            AggregateOp::Avg => IntState::Avg { sum: 0, count: 0 },
        }
    }

    fn fold(op: AggregateOp, state: IntState, value: i32) -> IntState {
        match (op, state) {
            (AggregateOp::Min, IntState::Simple(v)) => IntState::Simple(v.min(value)),
            (AggregateOp::Max, IntState::Simple(v)) => IntState::Simple(v.max(value)),
            (AggregateOp::Sum, IntState::Simple(v)) => IntState::Simple(v.wrapping_add(value)),
            (AggregateOp::Count, IntState::Simple(v)) => IntState::Simple(v + 1),
            (AggregateOp::Avg, IntState::Avg { sum, count }) => IntState::Avg {
                sum: sum.wrapping_add(value),
                count: count + 1,
            },
            _ => unreachable!("state shape is fixed by the operator"),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        let value = match tuple.field(self.agg_field) {
            Field::Int(v) => *v,
            other => {
                return Err(DbError::Db(format!(
                    "integer aggregator applied to a {} field",
                    other.field_type()
                )))
            }
        };
        let group = self.group_field.map(|g| tuple.field(g).clone());
        let state = self
            .groups
            .entry(group)
            .or_insert_with(|| Self::initial_state(self.op));
        *state = Self::fold(self.op, *state, value);
        Ok(())
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn results(&self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::with_capacity(self.groups.len());
        for (group, state) in &self.groups {
            let value = match *state {
                IntState::Simple(v) => v,
                IntState::Avg { sum, count } => sum / count,
            };
            let fields = match group {
                None => vec![Field::Int(value)],
                Some(group) => vec![group.clone(), Field::Int(value)],
            };
            tuples.push(Tuple::new(self.schema.clone(), fields));
        }
        Ok(tuples)
    }
}

/// Computes COUNT over a string field; no other operator applies.
pub struct StringAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    groups: HashMap<Option<Field>, i32>,
    schema: Arc<Schema>,
}

impl StringAggregator {
    /// # Panics
    /// Panics if `op` is anything but COUNT.
    pub fn new(
        group_field: Option<usize>,
        group_type: Option<FieldType>,
        agg_field: usize,
        op: AggregateOp,
    ) -> Self {
        assert_eq!(
            op,
            AggregateOp::Count,
            "string fields support COUNT only"
        );
        assert_eq!(group_field.is_some(), group_type.is_some());
        Self {
            group_field,
            agg_field,
            groups: HashMap::new(),
            schema: result_schema(group_type, op),
        }
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        if tuple.field(self.agg_field).field_type() != FieldType::Str {
            return Err(DbError::Db(
                "string aggregator applied to a non-string field".to_string(),
            ));
        }
        let group = self.group_field.map(|g| tuple.field(g).clone());
        *self.groups.entry(group).or_insert(0) += 1;
        Ok(())
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn results(&self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::with_capacity(self.groups.len());
        for (group, count) in &self.groups {
            let fields = match group {
                None => vec![Field::Int(*count)],
                Some(group) => vec![group.clone(), Field::Int(*count)],
            };
            tuples.push(Tuple::new(self.schema.clone(), fields));
        }
        Ok(tuples)
    }
}

/// The aggregation operator: drains its child on `open`, folding every
/// tuple into an aggregator picked by the aggregate field's type, then
/// emits one tuple per group.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Vec<Tuple>,
    index: usize,
    opened: bool,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Self {
        let child_schema = child.schema();
        let group_type = group_field.map(|g| child_schema.field_type(g));
        let schema = result_schema(group_type, op);
        Self {
            child,
            agg_field,
            group_field,
            op,
            schema,
            results: Vec::new(),
            index: 0,
            opened: false,
        }
    }

    fn make_aggregator(&self) -> Box<dyn Aggregator> {
        let child_schema = self.child.schema();
        let group_type = self.group_field.map(|g| child_schema.field_type(g));
        match child_schema.field_type(self.agg_field) {
            FieldType::Int => Box::new(IntegerAggregator::new(
                self.group_field,
                group_type,
                self.agg_field,
                self.op,
            )),
            FieldType::Str => Box::new(StringAggregator::new(
                self.group_field,
                group_type,
                self.agg_field,
                self.op,
            )),
        }
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        let mut aggregator = self.make_aggregator();
        self.child.open()?;
        while self.child.has_next()? {
            aggregator.merge(&self.child.next()?)?;
        }
        self.results = aggregator.results()?;
        self.index = 0;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.opened && self.index < self.results.len())
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        let tuple = self.results[self.index].clone();
        self.index += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.index = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
        self.results.clear();
        self.index = 0;
        self.child.close();
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "aggregate has exactly one child");
        self.child = children.pop().expect("length checked above");
        self.opened = false;
        self.results.clear();
    }
}
