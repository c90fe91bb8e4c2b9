use crate::tuple::{CompareOp, Field, Tuple};

/// Compares one field of a tuple against a literal.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CompareOp,
    operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: Field) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn operand(&self) -> &Field {
        &self.operand
    }

    /// Evaluates the predicate against one tuple.
    pub fn filter(&self, tuple: &Tuple) -> bool {
        tuple.field(self.field).compare(self.op, &self.operand)
    }
}

/// Compares a field of one tuple against a field of another.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    left_field: usize,
    op: CompareOp,
    right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn left_field(&self) -> usize {
        self.left_field
    }

    pub fn right_field(&self) -> usize {
        self.right_field
    }

    /// Evaluates the predicate against a pair of tuples.
    pub fn filter(&self, left: &Tuple, right: &Tuple) -> bool {
        left.field(self.left_field)
            .compare(self.op, right.field(self.right_field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{FieldType, Schema};
    use std::sync::Arc;

    fn tuple(values: &[i32]) -> Tuple {
        let schema = Arc::new(Schema::of(&vec![FieldType::Int; values.len()]));
        Tuple::new(schema, values.iter().map(|&v| Field::Int(v)).collect())
    }

    #[test]
    fn test_predicate() {
        let p = Predicate::new(1, CompareOp::GreaterThan, Field::Int(5));
        assert!(p.filter(&tuple(&[0, 6])));
        assert!(!p.filter(&tuple(&[9, 5])));
    }

    #[test]
    fn test_join_predicate() {
        let p = JoinPredicate::new(0, CompareOp::Equals, 1);
        assert!(p.filter(&tuple(&[3]), &tuple(&[0, 3])));
        assert!(!p.filter(&tuple(&[3]), &tuple(&[0, 4])));
    }
}
