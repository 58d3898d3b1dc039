//! Row predicates and their name-keyed construction registry.

use crate::error::ConvoyResult;
use crate::tuple::{TupleBatch, Value};

pub mod registry;

pub use registry::PredicateRegistry;

/// A boolean test over one row of a batch.
pub trait Predicate: Send {
    fn evaluate(&self, batch: &TupleBatch, row: usize) -> ConvoyResult<bool>;
}

/// Keeps rows whose `column` equals `value`.
pub struct EqualsPredicate {
    column: usize,
    value: Value,
}

impl EqualsPredicate {
    pub fn new(column: usize, value: Value) -> Self {
        Self { column, value }
    }
}

impl Predicate for EqualsPredicate {
    fn evaluate(&self, batch: &TupleBatch, row: usize) -> ConvoyResult<bool> {
        Ok(batch.value(self.column, row)? == self.value)
    }
}

/// Keeps rows whose `column` differs from `value`.
pub struct NotEqualsPredicate {
    column: usize,
    value: Value,
}

impl NotEqualsPredicate {
    pub fn new(column: usize, value: Value) -> Self {
        Self { column, value }
    }
}

impl Predicate for NotEqualsPredicate {
    fn evaluate(&self, batch: &TupleBatch, row: usize) -> ConvoyResult<bool> {
        Ok(batch.value(self.column, row)? != self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvoyError;
    use crate::tuple::{Schema, TupleBatchBuffer, TupleType};
    use std::sync::Arc;

    fn batch() -> TupleBatch {
        let schema = Arc::new(Schema::from_pairs(&[("v", TupleType::Long)]));
        let mut buffer = TupleBatchBuffer::with_capacity(schema, 10);
        for v in [1i64, 2, 2, 3] {
            buffer.put(0, Value::Long(v)).unwrap();
        }
        buffer.pop_any().unwrap()
    }

    #[test]
    fn equals_and_not_equals() {
        let batch = batch();
        let eq = EqualsPredicate::new(0, Value::Long(2));
        let ne = NotEqualsPredicate::new(0, Value::Long(2));
        let kept_eq: Vec<bool> = (0..4).map(|r| eq.evaluate(&batch, r).unwrap()).collect();
        let kept_ne: Vec<bool> = (0..4).map(|r| ne.evaluate(&batch, r).unwrap()).collect();
        assert_eq!(kept_eq, [false, true, true, false]);
        assert_eq!(kept_ne, [true, false, false, true]);
    }

    #[test]
    fn out_of_range_column_is_an_error() {
        let batch = batch();
        let eq = EqualsPredicate::new(3, Value::Long(2));
        assert!(matches!(
            eq.evaluate(&batch, 0),
            Err(ConvoyError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn mismatched_value_type_is_simply_unequal() {
        let batch = batch();
        let eq = EqualsPredicate::new(0, Value::Str("2".to_string()));
        assert!(!eq.evaluate(&batch, 1).unwrap());
    }
}
